//! Local transaction over the directory store.
//!
//! State transitions:
//! - Created -> Begun -> Committed -> Completed
//! - Created -> Begun -> RolledBack
//!
//! `commit` is a single directory rename from `.pending` to `.committed`.
//! Once it succeeds the inbound message counts as consumed and every
//! enlisted operation will be delivered, if need be by a recovery sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::{
    METADATA_SUFFIX, MoveOutcome, QueuePaths, QueueStore, STAGED_BODY_SUFFIX, STAGED_SUFFIX,
    StagedOperation, check_message_id, file_name, remove_dir_if_exists, remove_file_if_exists,
};
use crate::domain::{Address, OutgoingMessage, StoreError, TransactionId, TransportEvent};
use crate::ports::TransactionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Begun,
    Committed,
    Completed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Created => "created",
            TransactionState::Begun => "begun",
            TransactionState::Committed => "committed",
            TransactionState::Completed => "completed",
            TransactionState::RolledBack => "rolled_back",
        }
    }
}

/// Staging unit for one inbound message.
///
/// Owned by the consumer that claimed the message; nothing else mutates it.
pub struct LocalTransaction {
    store: QueueStore,
    queue: Address,
    paths: QueuePaths,
    id: TransactionId,
    pending_dir: PathBuf,
    committed_dir: PathBuf,

    /// File name of the claimed inbound metadata inside the staging dir.
    inbound: Option<String>,

    /// Base names of staged operations, in enlist order.
    outgoing: Vec<String>,
    next_seq: u32,
    state: TransactionState,
}

impl LocalTransaction {
    pub fn new(store: QueueStore, queue: Address, id: TransactionId) -> Result<Self, StoreError> {
        let paths = store.paths(&queue)?;
        let dir_name = id.to_string();
        Ok(Self {
            pending_dir: paths.pending.join(&dir_name),
            committed_dir: paths.committed.join(&dir_name),
            store,
            queue,
            paths,
            id,
            inbound: None,
            outgoing: Vec::new(),
            next_seq: 0,
            state: TransactionState::Created,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn queue(&self) -> &Address {
        &self.queue
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn enlisted(&self) -> usize {
        self.outgoing.len()
    }

    /// Current location of the claimed inbound metadata file.
    pub fn inbound_path(&self) -> Option<PathBuf> {
        let dir = match self.state {
            TransactionState::Begun => &self.pending_dir,
            TransactionState::Committed => &self.committed_dir,
            _ => return None,
        };
        self.inbound.as_ref().map(|name| dir.join(name))
    }

    fn invalid(&self, operation: &'static str) -> StoreError {
        StoreError::InvalidState {
            transaction: self.id.to_string(),
            operation,
            state: self.state.as_str(),
        }
    }

    /// Create the staging dir and move the claimed file into it.
    ///
    /// `Ok(false)` means a competing consumer took the file first; the
    /// staging dir is removed again.
    pub async fn begin(&mut self, incoming: &Path) -> Result<bool, StoreError> {
        if self.state != TransactionState::Created {
            return Err(self.invalid("begin"));
        }
        let name = file_name(incoming)
            .ok_or_else(|| StoreError::CorruptMetadata {
                path: incoming.to_path_buf(),
                reason: "no file name".to_string(),
            })?
            .to_string();

        tokio::fs::create_dir_all(&self.pending_dir)
            .await
            .map_err(|e| StoreError::io(&self.pending_dir, e))?;

        let outcome = QueueStore::move_exclusive(incoming, &self.pending_dir.join(&name)).await;
        match outcome {
            Ok(MoveOutcome::Claimed) => {
                self.inbound = Some(name);
                self.state = TransactionState::Begun;
                Ok(true)
            }
            Ok(MoveOutcome::AlreadyTaken) => {
                remove_dir_if_exists(&self.pending_dir).await?;
                Ok(false)
            }
            Err(e) => {
                let _ = remove_dir_if_exists(&self.pending_dir).await;
                Err(e)
            }
        }
    }

    /// Stage `message` for `destination`. Nothing becomes visible until
    /// the transaction completes.
    pub async fn enlist(&mut self, message: &OutgoingMessage, destination: &Address) -> Result<(), StoreError> {
        if self.state != TransactionState::Begun {
            return Err(self.invalid("enlist"));
        }
        self.store.paths(destination)?;
        check_message_id(message.message_id())?;

        let base = format!("{:06}-{}", self.next_seq, message.message_id());
        self.next_seq += 1;

        let body_path = self.pending_dir.join(format!("{base}{STAGED_BODY_SUFFIX}"));
        tokio::fs::write(&body_path, message.body())
            .await
            .map_err(|e| StoreError::io(&body_path, e))?;

        let record = StagedOperation {
            message_id: message.message_id().to_string(),
            destination: destination.clone(),
            headers: message.headers().clone(),
        };
        let record_path = self.pending_dir.join(format!("{base}{STAGED_SUFFIX}"));
        tokio::fs::write(&record_path, serde_json::to_vec(&record)?)
            .await
            .map_err(|e| StoreError::io(&record_path, e))?;

        self.outgoing.push(base);
        Ok(())
    }

    /// Point of no return: promote the whole staging dir.
    pub async fn commit(&mut self) -> Result<(), StoreError> {
        if self.state != TransactionState::Begun {
            return Err(self.invalid("commit"));
        }
        tokio::fs::create_dir_all(&self.paths.committed)
            .await
            .map_err(|e| StoreError::io(&self.paths.committed, e))?;
        tokio::fs::rename(&self.pending_dir, &self.committed_dir)
            .await
            .map_err(|e| StoreError::io(&self.pending_dir, e))?;

        self.state = TransactionState::Committed;
        self.store.sink().emit(TransportEvent::TransactionCommitted {
            transaction_id: self.id,
            operations: self.outgoing.len(),
        });
        Ok(())
    }

    /// Deliver every enlisted operation, then drop the committed staging.
    ///
    /// Returns `Ok(false)` when called before `commit`. A failed delivery
    /// is reported but not fatal; the committed dir is then left in place
    /// for the next recovery sweep to finish.
    pub async fn complete(&mut self) -> Result<bool, StoreError> {
        if self.state != TransactionState::Committed {
            return Ok(false);
        }

        let mut delivered = 0;
        let mut failed = 0;
        for base in std::mem::take(&mut self.outgoing) {
            match self.store.deliver_staged(&self.committed_dir, &base).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    self.store.sink().emit(TransportEvent::DeliveryFailed {
                        transaction_id: self.id.to_string(),
                        operation: base,
                        error: e.to_string(),
                    });
                }
            }
        }

        if failed == 0 {
            if let Some(message_id) = self.inbound.as_deref().and_then(|n| n.strip_suffix(METADATA_SUFFIX)) {
                remove_file_if_exists(&self.paths.body_path(message_id)).await?;
            }
            remove_dir_if_exists(&self.committed_dir).await?;
        }

        self.state = TransactionState::Completed;
        self.store.sink().emit(TransportEvent::TransactionCompleted {
            transaction_id: self.id,
            delivered,
            failed,
        });
        Ok(true)
    }

    /// Put the inbound message back and discard everything enlisted.
    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        if self.state != TransactionState::Begun {
            return Err(self.invalid("rollback"));
        }
        if let Some(name) = &self.inbound {
            let from = self.pending_dir.join(name);
            let to = self.paths.base.join(name);
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|e| StoreError::io(&from, e))?;
        }
        remove_dir_if_exists(&self.pending_dir).await?;

        let discarded = std::mem::take(&mut self.outgoing).len();
        self.state = TransactionState::RolledBack;
        self.store.sink().emit(TransportEvent::TransactionRolledBack {
            transaction_id: self.id,
            discarded,
        });
        Ok(())
    }

    pub async fn clear_pending_outgoing_operations(&mut self) -> Result<(), StoreError> {
        if self.state != TransactionState::Begun {
            return Err(self.invalid("clear pending operations"));
        }
        for base in std::mem::take(&mut self.outgoing) {
            remove_file_if_exists(&self.pending_dir.join(format!("{base}{STAGED_SUFFIX}"))).await?;
            remove_file_if_exists(&self.pending_dir.join(format!("{base}{STAGED_BODY_SUFFIX}"))).await?;
        }
        Ok(())
    }
}

/// A transaction shared between the pump and the pipeline contexts it
/// hands out (including forked ones).
#[derive(Clone)]
pub struct SharedTransaction {
    inner: Arc<Mutex<LocalTransaction>>,
}

impl SharedTransaction {
    pub fn new(transaction: LocalTransaction) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transaction)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, LocalTransaction> {
        self.inner.lock().await
    }
}

#[async_trait]
impl TransactionContext for SharedTransaction {
    async fn enlist(&self, message: &OutgoingMessage, destination: &Address) -> Result<(), StoreError> {
        self.inner.lock().await.enlist(message, destination).await
    }

    async fn clear_pending_outgoing_operations(&self) -> Result<(), StoreError> {
        self.inner.lock().await.clear_pending_outgoing_operations().await
    }
}
