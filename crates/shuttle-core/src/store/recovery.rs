//! Recovery Sweeper - 起動時にクラッシュの後始末をする
//!
//! # フロー
//! 1. `.tmp/`: write-then-rename の途中で死んだ scratch ファイルを削除
//! 2. `.pending/<tx>`: commit 前に死んだ → inbound を queue に戻して削除（rollback 相当）
//! 3. `.committed/<tx>`: commit 後に死んだ → 残りの送信を全部配送して削除（complete 相当）。
//!    1 件でも配送に失敗したらディレクトリは残し、次の sweep でやり直す
//!
//! 何度実行しても同じ結果になること（途中で止まっても再実行できる）。
//! 配送済みかどうか判別できない送信は再配送します。at-least-once なので重複は許容。

use std::ops::AddAssign;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use ulid::Ulid;

use super::{
    METADATA_SUFFIX, QueuePaths, QueueStore, STAGED_BODY_SUFFIX, STAGED_SUFFIX, StagedDelivery, file_name,
    list_dir, remove_dir_if_exists, remove_file_if_exists,
};
use crate::domain::{Address, StoreError, TransportEvent};
use crate::ports::EventSink;

/// Producers in other processes may be mid-write into `.tmp`.
const SCRATCH_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub pending_rolled_back: usize,
    pub committed_completed: usize,
    /// Committed transactions left in place because a delivery failed.
    pub committed_deferred: usize,
    pub messages_restored: usize,
    pub operations_redelivered: usize,
    pub operations_already_delivered: usize,
    pub scratch_files_removed: usize,
    pub step_failures: usize,
}

impl AddAssign for RecoveryReport {
    fn add_assign(&mut self, other: Self) {
        self.pending_rolled_back += other.pending_rolled_back;
        self.committed_completed += other.committed_completed;
        self.committed_deferred += other.committed_deferred;
        self.messages_restored += other.messages_restored;
        self.operations_redelivered += other.operations_redelivered;
        self.operations_already_delivered += other.operations_already_delivered;
        self.scratch_files_removed += other.scratch_files_removed;
        self.step_failures += other.step_failures;
    }
}

pub struct RecoverySweeper {
    store: QueueStore,
    sink: Arc<dyn EventSink>,
}

impl RecoverySweeper {
    pub fn new(store: QueueStore) -> Self {
        let sink = store.sink().clone();
        Self { store, sink }
    }

    /// Resolve every leftover transaction of `queue`.
    ///
    /// Runs single-threaded and must finish before new claims start.
    pub async fn sweep(&self, queue: &Address) -> Result<RecoveryReport, StoreError> {
        let paths = self.store.paths(queue)?;
        let mut report = RecoveryReport::default();

        let cutoff = SystemTime::now()
            .checked_sub(SCRATCH_GRACE)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        for scratch in self.entries(&paths.tmp, &mut report).await {
            if !file_name(&scratch).is_some_and(|n| scratch_is_stale(n, cutoff)) {
                continue;
            }
            match remove_file_if_exists(&scratch).await {
                Ok(()) => report.scratch_files_removed += 1,
                Err(e) => self.step_failed(&scratch, e.to_string(), &mut report),
            }
        }

        let mut pending = list_dir(&paths.pending).await?;
        pending.sort();
        for tx_dir in pending {
            let restored = self.recover_pending(&paths, &tx_dir, &mut report).await;
            report.pending_rolled_back += 1;
            report.messages_restored += restored;
            self.sink.emit(TransportEvent::PendingTransactionRecovered {
                queue: queue.clone(),
                transaction: file_name(&tx_dir).unwrap_or_default().to_string(),
                restored,
            });
        }

        let mut committed = list_dir(&paths.committed).await?;
        committed.sort();
        for tx_dir in committed {
            let Some(redelivered) = self.recover_committed(&paths, &tx_dir, &mut report).await else {
                report.committed_deferred += 1;
                continue;
            };
            report.committed_completed += 1;
            report.operations_redelivered += redelivered;
            self.sink.emit(TransportEvent::CommittedTransactionRecovered {
                queue: queue.clone(),
                transaction: file_name(&tx_dir).unwrap_or_default().to_string(),
                redelivered,
            });
        }

        Ok(report)
    }

    async fn recover_pending(&self, paths: &QueuePaths, tx_dir: &Path, report: &mut RecoveryReport) -> usize {
        let mut restored = 0;
        for file in self.entries(tx_dir, report).await {
            let Some(name) = file_name(&file) else { continue };
            if !name.ends_with(METADATA_SUFFIX) {
                continue;
            }
            // 失敗したら competing consumer が先に戻したとみなす
            match tokio::fs::rename(&file, paths.base.join(name)).await {
                Ok(()) => restored += 1,
                Err(e) => self.step_failed(&file, e.to_string(), report),
            }
        }
        self.remove_dir(tx_dir, report).await;
        restored
    }

    /// Deliver what is still staged in `tx_dir`. `None` when a delivery
    /// failed and the transaction was kept for the next sweep.
    async fn recover_committed(
        &self,
        paths: &QueuePaths,
        tx_dir: &Path,
        report: &mut RecoveryReport,
    ) -> Option<usize> {
        let mut redelivered = 0;
        let mut failed = 0;
        let mut inbound = Vec::new();
        let mut entries = match list_dir(tx_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                self.step_failed(tx_dir, e.to_string(), report);
                return None;
            }
        };
        entries.sort();

        for file in entries {
            let Some(name) = file_name(&file) else { continue };

            if let Some(message_id) = name.strip_suffix(METADATA_SUFFIX) {
                inbound.push(message_id.to_string());
                continue;
            }
            if name.ends_with(STAGED_BODY_SUFFIX) {
                continue;
            }
            let Some(base) = name.strip_suffix(STAGED_SUFFIX) else { continue };

            match self.store.deliver_staged(tx_dir, base).await {
                Ok(StagedDelivery::Delivered) => redelivered += 1,
                Ok(StagedDelivery::AlreadyDelivered) => report.operations_already_delivered += 1,
                Err(e) => {
                    failed += 1;
                    self.step_failed(&file, e.to_string(), report);
                }
            }
        }
        if failed > 0 {
            return None;
        }

        // inbound は commit 時点で消費済み
        for message_id in inbound {
            let body = paths.body_path(&message_id);
            if let Err(e) = remove_file_if_exists(&body).await {
                self.step_failed(&body, e.to_string(), report);
            }
        }
        self.remove_dir(tx_dir, report).await;
        Some(redelivered)
    }

    async fn entries(&self, dir: &Path, report: &mut RecoveryReport) -> Vec<std::path::PathBuf> {
        match list_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                self.step_failed(dir, e.to_string(), report);
                Vec::new()
            }
        }
    }

    async fn remove_dir(&self, dir: &Path, report: &mut RecoveryReport) {
        if let Err(e) = remove_dir_if_exists(dir).await {
            self.step_failed(dir, e.to_string(), report);
        }
    }

    fn step_failed(&self, path: &Path, error: String, report: &mut RecoveryReport) {
        report.step_failures += 1;
        self.sink.emit(TransportEvent::RecoveryStepFailed {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Scratch files are named `<ulid>.<target>`; anything else is debris.
fn scratch_is_stale(name: &str, cutoff: SystemTime) -> bool {
    let prefix = name.split('.').next().unwrap_or_default();
    match Ulid::from_string(prefix) {
        Ok(ulid) => ulid.datetime() < cutoff,
        Err(_) => true,
    }
}
