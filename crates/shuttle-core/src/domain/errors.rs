//! Errors - ストア層のエラー型
//!
//! "別の consumer が先に取った" は正常系なのでここには含めません
//! （`MoveOutcome::AlreadyTaken` で表現）。

use std::path::PathBuf;

use super::address::Address;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("address '{0}' cannot be used as a queue directory")]
    InvalidAddress(Address),

    #[error("message id '{0}' cannot be used as a file name")]
    InvalidMessageId(String),

    #[error("transaction {transaction} cannot {operation} in state {state}")]
    InvalidState {
        transaction: String,
        operation: &'static str,
        state: &'static str,
    },

    #[error("corrupt metadata at {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Was this caused by a file that no longer exists?
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
