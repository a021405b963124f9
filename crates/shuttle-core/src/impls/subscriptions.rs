//! InMemorySubscriptions - プロセス内だけの購読者集合
//!
//! 永続化はしません。再起動すると購読は消えます。

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::MessageType;
use crate::ports::{SubscriptionError, SubscriptionStore};

#[derive(Debug, Default)]
pub struct InMemorySubscriptions {
    subscribers: RwLock<HashMap<MessageType, BTreeSet<String>>>,
}

impl InMemorySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, message_type: MessageType, endpoint: impl Into<String>) {
        self.subscribers
            .write()
            .await
            .entry(message_type)
            .or_default()
            .insert(endpoint.into());
    }

    pub async fn unsubscribe(&self, message_type: &MessageType, endpoint: &str) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(endpoints) = subscribers.get_mut(message_type) {
            endpoints.remove(endpoint);
            if endpoints.is_empty() {
                subscribers.remove(message_type);
            }
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptions {
    async fn subscribers(&self, message_type: &MessageType) -> Result<Vec<String>, SubscriptionError> {
        Ok(self
            .subscribers
            .read()
            .await
            .get(message_type)
            .map(|endpoints| endpoints.iter().cloned().collect())
            .unwrap_or_default())
    }
}
