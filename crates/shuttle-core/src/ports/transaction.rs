//! TransactionContext port - pipeline から見たトランザクション
//!
//! pipeline は store の実装を知らず、この capability だけを受け取ります。
//! fork した pipeline も親と同じ TransactionContext を共有するので、
//! 送信の durability は親の commit/rollback に従います。

use async_trait::async_trait;

use crate::domain::{Address, OutgoingMessage, StoreError};

#[async_trait]
pub trait TransactionContext: Send + Sync {
    /// Stage `message` for delivery to `destination` once the owner commits.
    async fn enlist(&self, message: &OutgoingMessage, destination: &Address)
    -> Result<(), StoreError>;

    /// Drop everything enlisted so far without touching the inbound message.
    async fn clear_pending_outgoing_operations(&self) -> Result<(), StoreError>;
}
