//! SubscriptionStore port - publish/subscribe の購読者集合
//!
//! 購読の永続化は外部トランスポートの責務です。
//! routing は「型 T を今購読している論理 endpoint は？」だけを聞きます。

use async_trait::async_trait;

use crate::domain::MessageType;

#[derive(Debug, thiserror::Error)]
#[error("subscription lookup failed: {0}")]
pub struct SubscriptionError(pub String);

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Logical endpoint names currently subscribed to `message_type`.
    async fn subscribers(&self, message_type: &MessageType)
    -> Result<Vec<String>, SubscriptionError>;
}
