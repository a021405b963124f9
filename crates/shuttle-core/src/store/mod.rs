//! Durable Queue Store - ディレクトリと rename だけで作るキュー
//!
//! # レイアウト（queue `q`, root `R`）
//! - `R/q/<message_id>.metadata.txt`: ready（headers の JSON）
//! - `R/q/.bodies/<message_id>.body.txt`: body
//! - `R/q/.pending/<tx-id>/`: commit 前のトランザクション
//! - `R/q/.committed/<tx-id>/`: commit 済み・complete 前のトランザクション
//! - `R/q/.tmp/`: write-then-rename 用
//!
//! # 排他
//! 外部ロックは使いません。同じファイルを取り合った場合、rename に
//! 成功した 1 つだけが所有者になり、残りは `MoveOutcome::AlreadyTaken`。

mod recovery;
mod transaction;

pub use recovery::{RecoveryReport, RecoverySweeper};
pub use transaction::{LocalTransaction, SharedTransaction, TransactionState};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::domain::address::is_single_segment;
use crate::domain::{Address, Headers, IncomingMessage, OutgoingMessage, StoreError, TransportEvent};
use crate::ports::{EventSink, IdGenerator};

pub(crate) const METADATA_SUFFIX: &str = ".metadata.txt";
pub(crate) const BODY_SUFFIX: &str = ".body.txt";
pub(crate) const STAGED_SUFFIX: &str = ".out";
pub(crate) const STAGED_BODY_SUFFIX: &str = ".body.out";

const BODIES_DIR: &str = ".bodies";
const PENDING_DIR: &str = ".pending";
const COMMITTED_DIR: &str = ".committed";
const TMP_DIR: &str = ".tmp";

/// Result of the exclusive move primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Claimed,
    /// Source vanished: somebody else moved it first. Not an error.
    AlreadyTaken,
}

/// Physical locations of one queue.
#[derive(Debug, Clone)]
pub struct QueuePaths {
    pub base: PathBuf,
    pub bodies: PathBuf,
    pub pending: PathBuf,
    pub committed: PathBuf,
    pub tmp: PathBuf,
}

impl QueuePaths {
    pub fn body_path(&self, message_id: &str) -> PathBuf {
        self.bodies.join(format!("{message_id}{BODY_SUFFIX}"))
    }

    pub fn metadata_path(&self, message_id: &str) -> PathBuf {
        self.base.join(format!("{message_id}{METADATA_SUFFIX}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub ready: usize,
    pub pending_transactions: usize,
    pub committed_transactions: usize,
}

/// Staged record of one enlisted operation (`<base>.out`).
///
/// The destination is persisted so that a recovery sweep can finish
/// delivery after the owning process died.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StagedOperation {
    pub message_id: String,
    pub destination: Address,
    pub headers: Headers,
}

/// Outcome of delivering one staged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StagedDelivery {
    Delivered,
    /// An earlier attempt already made it visible; only the record was dropped.
    AlreadyDelivered,
}

/// Exclusive ownership of one inbound message.
pub struct ClaimedMessage {
    pub transaction: LocalTransaction,
    pub message: IncomingMessage,
}

#[derive(Clone)]
pub struct QueueStore {
    root: PathBuf,
    ids: Arc<dyn IdGenerator>,
    sink: Arc<dyn EventSink>,
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>, ids: Arc<dyn IdGenerator>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            root: root.into(),
            ids,
            sink,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn paths(&self, queue: &Address) -> Result<QueuePaths, StoreError> {
        if !queue.is_single_segment() {
            return Err(StoreError::InvalidAddress(queue.clone()));
        }
        let base = self.root.join(queue.as_str());
        Ok(QueuePaths {
            bodies: base.join(BODIES_DIR),
            pending: base.join(PENDING_DIR),
            committed: base.join(COMMITTED_DIR),
            tmp: base.join(TMP_DIR),
            base,
        })
    }

    /// Create the directories a queue needs to accept deliveries.
    pub async fn ensure_queue(&self, queue: &Address) -> Result<QueuePaths, StoreError> {
        let paths = self.paths(queue)?;
        for dir in [&paths.base, &paths.bodies, &paths.tmp] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }
        Ok(paths)
    }

    /// Atomically move `from` to `to`. At most one concurrent caller wins.
    pub async fn move_exclusive(from: &Path, to: &Path) -> Result<MoveOutcome, StoreError> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(MoveOutcome::Claimed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(MoveOutcome::AlreadyTaken),
            Err(e) => Err(StoreError::io(from, e)),
        }
    }

    /// Place `message` in the ready set of `destination`.
    ///
    /// The body lands first; the metadata rename is the visibility point.
    pub async fn deliver(&self, destination: &Address, message: &OutgoingMessage) -> Result<(), StoreError> {
        check_message_id(message.message_id())?;
        let paths = self.ensure_queue(destination).await?;
        write_atomic(&paths.tmp, &paths.body_path(message.message_id()), message.body()).await?;
        let metadata = serde_json::to_vec(message.headers())?;
        write_atomic(&paths.tmp, &paths.metadata_path(message.message_id()), &metadata).await
    }

    /// Deliver one staged operation found in `staging_dir`.
    ///
    /// Safe to repeat. When the staged body is already gone, an earlier
    /// attempt moved it; the metadata is only written again if that attempt
    /// died before the message became visible.
    pub(crate) async fn deliver_staged(
        &self,
        staging_dir: &Path,
        base_name: &str,
    ) -> Result<StagedDelivery, StoreError> {
        let record_path = staging_dir.join(format!("{base_name}{STAGED_SUFFIX}"));
        let raw = tokio::fs::read(&record_path)
            .await
            .map_err(|e| StoreError::io(&record_path, e))?;
        let op: StagedOperation =
            serde_json::from_slice(&raw).map_err(|e| StoreError::CorruptMetadata {
                path: record_path.clone(),
                reason: e.to_string(),
            })?;
        check_message_id(&op.message_id)?;

        let paths = self.ensure_queue(&op.destination).await?;
        let staged_body = staging_dir.join(format!("{base_name}{STAGED_BODY_SUFFIX}"));
        let moved = Self::move_exclusive(&staged_body, &paths.body_path(&op.message_id)).await?;

        if moved == MoveOutcome::AlreadyTaken && already_visible(&paths, &op.message_id).await? {
            remove_file_if_exists(&record_path).await?;
            return Ok(StagedDelivery::AlreadyDelivered);
        }

        let metadata = serde_json::to_vec(&op.headers)?;
        write_atomic(&paths.tmp, &paths.metadata_path(&op.message_id), &metadata).await?;

        remove_file_if_exists(&record_path).await?;
        Ok(StagedDelivery::Delivered)
    }

    /// Ready metadata files, oldest first.
    pub async fn ready_messages(&self, queue: &Address) -> Result<Vec<PathBuf>, StoreError> {
        let paths = self.paths(queue)?;
        let mut ready: Vec<PathBuf> = list_dir(&paths.base)
            .await?
            .into_iter()
            .filter(|p| file_name(p).is_some_and(|n| n.ends_with(METADATA_SUFFIX)))
            .collect();
        ready.sort();
        Ok(ready)
    }

    /// Claim one ready message into a new local transaction.
    ///
    /// Returns `Ok(None)` when the queue is empty or every candidate was
    /// taken by a competing consumer. A corrupt candidate is put back and
    /// skipped so it does not block the rest of the queue.
    pub async fn claim(&self, queue: &Address) -> Result<Option<ClaimedMessage>, StoreError> {
        let paths = self.paths(queue)?;
        let mut first_error = None;

        for candidate in self.ready_messages(queue).await? {
            let mut transaction =
                LocalTransaction::new(self.clone(), queue.clone(), self.ids.generate_transaction_id())?;

            if !transaction.begin(&candidate).await? {
                self.sink.emit(TransportEvent::ClaimMissed {
                    queue: queue.clone(),
                    file: candidate,
                });
                continue;
            }

            match read_inbound(&paths, &transaction).await {
                Ok(message) => {
                    self.sink.emit(TransportEvent::MessageClaimed {
                        queue: queue.clone(),
                        message_id: message.message_id().to_string(),
                        transaction_id: transaction.id(),
                    });
                    return Ok(Some(ClaimedMessage {
                        transaction,
                        message,
                    }));
                }
                Err(e) => {
                    transaction.rollback().await?;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    pub async fn counts(&self, queue: &Address) -> Result<QueueCounts, StoreError> {
        let paths = self.paths(queue)?;
        Ok(QueueCounts {
            ready: self.ready_messages(queue).await?.len(),
            pending_transactions: list_dir(&paths.pending).await?.len(),
            committed_transactions: list_dir(&paths.committed).await?.len(),
        })
    }
}

async fn read_inbound(paths: &QueuePaths, transaction: &LocalTransaction) -> Result<IncomingMessage, StoreError> {
    let path = transaction.inbound_path().ok_or_else(|| StoreError::InvalidState {
        transaction: transaction.id().to_string(),
        operation: "read inbound",
        state: transaction.state().as_str(),
    })?;
    let message_id = file_name(&path)
        .and_then(|n| n.strip_suffix(METADATA_SUFFIX))
        .map(str::to_string)
        .ok_or_else(|| StoreError::CorruptMetadata {
            path: path.clone(),
            reason: "unexpected file name".to_string(),
        })?;

    let raw = tokio::fs::read(&path)
        .await
        .map_err(|e| StoreError::io(&path, e))?;
    let headers: Headers = serde_json::from_slice(&raw).map_err(|e| StoreError::CorruptMetadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    // deliver は空 body でも必ずファイルを書く
    let body_path = paths.body_path(&message_id);
    let body = match tokio::fs::read(&body_path).await {
        Ok(body) => body,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::CorruptMetadata {
                path: body_path,
                reason: "body file is missing".to_string(),
            });
        }
        Err(e) => return Err(StoreError::io(&body_path, e)),
    };

    Ok(IncomingMessage::new(message_id, headers, body))
}

/// Message ids become file names, so they must be a single plain segment.
pub fn check_message_id(message_id: &str) -> Result<(), StoreError> {
    if is_single_segment(message_id) {
        Ok(())
    } else {
        Err(StoreError::InvalidMessageId(message_id.to_string()))
    }
}

/// Has the message whose body sits (or sat) in `paths` already been made
/// visible? Its body is gone once a consumer completed it, and its metadata
/// is either ready or held by a transaction of the destination queue.
async fn already_visible(paths: &QueuePaths, message_id: &str) -> Result<bool, StoreError> {
    if !exists(&paths.body_path(message_id)).await? {
        return Ok(true);
    }
    if exists(&paths.metadata_path(message_id)).await? {
        return Ok(true);
    }
    let name = format!("{message_id}{METADATA_SUFFIX}");
    for holder in [&paths.pending, &paths.committed] {
        for tx_dir in list_dir(holder).await? {
            if exists(&tx_dir.join(&name)).await? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn exists(path: &Path) -> Result<bool, StoreError> {
    tokio::fs::try_exists(path).await.map_err(|e| StoreError::io(path, e))
}

/// Write to a scratch file, then rename into place.
pub(crate) async fn write_atomic(tmp_dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let name = file_name(target).unwrap_or("message");
    let scratch = tmp_dir.join(format!("{}.{name}", Ulid::new()));
    tokio::fs::write(&scratch, bytes)
        .await
        .map_err(|e| StoreError::io(&scratch, e))?;
    if let Err(e) = tokio::fs::rename(&scratch, target).await {
        let _ = tokio::fs::remove_file(&scratch).await;
        return Err(StoreError::io(target, e));
    }
    Ok(())
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Entries of `dir`; a missing directory is empty.
pub(crate) async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        out.push(entry.path());
    }
    Ok(out)
}

pub(crate) fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
