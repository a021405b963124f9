//! Distribution - 論理 endpoint の複数 instance から 1 つを選ぶ
//!
//! # 純粋関数
//! 同じ候補集合と同じメッセージなら、プロセスが生きている間は
//! 必ず同じ address を返します（内部状態を持たない）。
//!
//! # scope
//! `Send` 用の strategy は publish には使われず、その逆も同様です。

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use super::error::RoutingError;
use super::instances::EndpointInstance;
use crate::domain::{Address, OutgoingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DistributionScope {
    Send,
    Publish,
}

/// What a strategy may look at.
pub struct DistributionContext<'a> {
    receiver_addresses: &'a [Address],
    message: &'a OutgoingMessage,
}

impl<'a> DistributionContext<'a> {
    pub fn new(receiver_addresses: &'a [Address], message: &'a OutgoingMessage) -> Self {
        Self {
            receiver_addresses,
            message,
        }
    }

    pub fn receiver_addresses(&self) -> &'a [Address] {
        self.receiver_addresses
    }

    pub fn message(&self) -> &'a OutgoingMessage {
        self.message
    }

    pub fn to_transport_address(&self, instance: &EndpointInstance) -> Address {
        instance.transport_address()
    }
}

/// DistributionStrategy は endpoint + scope ごとに 1 つ登録する
pub trait DistributionStrategy: Send + Sync {
    fn endpoint(&self) -> &str;

    fn scope(&self) -> DistributionScope;

    fn select_destination(&self, context: &DistributionContext<'_>) -> Result<Address, RoutingError>;
}

/// Default strategy: spreads messages over instances by hashing the
/// message id.
#[derive(Debug, Clone)]
pub struct UniformDistribution {
    endpoint: String,
    scope: DistributionScope,
}

impl UniformDistribution {
    pub fn new(endpoint: impl Into<String>, scope: DistributionScope) -> Self {
        Self {
            endpoint: endpoint.into(),
            scope,
        }
    }

    pub(crate) fn pick(endpoint: &str, context: &DistributionContext<'_>) -> Result<Address, RoutingError> {
        let candidates = context.receiver_addresses();
        if candidates.is_empty() {
            return Err(RoutingError::NoInstances(endpoint.to_string()));
        }
        // DefaultHasher::new() は固定 key なので結果は決定的
        let mut hasher = DefaultHasher::new();
        context.message().message_id().hash(&mut hasher);
        let index = (hasher.finish() % candidates.len() as u64) as usize;
        Ok(candidates[index].clone())
    }
}

impl DistributionStrategy for UniformDistribution {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn scope(&self) -> DistributionScope {
        self.scope
    }

    fn select_destination(&self, context: &DistributionContext<'_>) -> Result<Address, RoutingError> {
        Self::pick(&self.endpoint, context)
    }
}

/// Sticky addressing: always the instance with the given discriminator.
#[derive(Debug, Clone)]
pub struct PinnedDistribution {
    endpoint: String,
    scope: DistributionScope,
    discriminator: String,
}

impl PinnedDistribution {
    pub fn new(endpoint: impl Into<String>, discriminator: impl Into<String>, scope: DistributionScope) -> Self {
        Self {
            endpoint: endpoint.into(),
            scope,
            discriminator: discriminator.into(),
        }
    }
}

impl DistributionStrategy for PinnedDistribution {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn scope(&self) -> DistributionScope {
        self.scope
    }

    fn select_destination(&self, context: &DistributionContext<'_>) -> Result<Address, RoutingError> {
        let pinned = context.to_transport_address(
            &EndpointInstance::new(self.endpoint.clone()).with_discriminator(self.discriminator.clone()),
        );
        context
            .receiver_addresses()
            .iter()
            .find(|candidate| **candidate == pinned)
            .cloned()
            .ok_or_else(|| RoutingError::NoMatchingInstance {
                endpoint: self.endpoint.clone(),
                candidates: context.receiver_addresses().to_vec(),
            })
    }
}

/// Registered strategies keyed by (endpoint, scope). Falls back to
/// `UniformDistribution`.
#[derive(Clone, Default)]
pub struct DistributionPolicy {
    strategies: HashMap<(String, DistributionScope), Arc<dyn DistributionStrategy>>,
}

impl DistributionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_distribution_strategy(&mut self, strategy: Arc<dyn DistributionStrategy>) {
        let key = (strategy.endpoint().to_string(), strategy.scope());
        self.strategies.insert(key, strategy);
    }

    pub fn select(
        &self,
        endpoint: &str,
        scope: DistributionScope,
        context: &DistributionContext<'_>,
    ) -> Result<Address, RoutingError> {
        match self.strategies.get(&(endpoint.to_string(), scope)) {
            Some(strategy) => strategy.select_destination(context),
            None => UniformDistribution::pick(endpoint, context),
        }
    }
}
