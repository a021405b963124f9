//! Events - トランスポートで発生したイベント
//!
//! コンポーネントは `EventSink` にこれを渡すだけで、ログ出力先は知りません。

use std::path::PathBuf;

use super::address::Address;
use super::ids::TransactionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    MessageClaimed {
        queue: Address,
        message_id: String,
        transaction_id: TransactionId,
    },
    /// A competing consumer moved the file first.
    ClaimMissed { queue: Address, file: PathBuf },
    TransactionCommitted {
        transaction_id: TransactionId,
        operations: usize,
    },
    TransactionCompleted {
        transaction_id: TransactionId,
        delivered: usize,
        failed: usize,
    },
    TransactionRolledBack {
        transaction_id: TransactionId,
        discarded: usize,
    },
    /// One staged operation could not be delivered; left for recovery.
    DeliveryFailed {
        transaction_id: String,
        operation: String,
        error: String,
    },
    PendingTransactionRecovered {
        queue: Address,
        transaction: String,
        restored: usize,
    },
    CommittedTransactionRecovered {
        queue: Address,
        transaction: String,
        redelivered: usize,
    },
    /// Logged and treated as already resolved.
    RecoveryStepFailed { path: PathBuf, error: String },
    ProcessingFailed {
        message_id: String,
        attempts: u32,
        error: String,
    },
    ForwardedToErrorQueue {
        message_id: String,
        error_queue: Address,
    },
    RetryAcknowledged {
        retry_id: String,
        coordinator: Address,
    },
}
