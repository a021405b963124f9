//! Router - message type + intent から物理 address を決める
//!
//! # フロー
//! 1. conventions で kind（command / event / message）を判定し、intent と矛盾しないか確認
//! 2. `resolve`: 論理的な宛先（UnicastRoute）を集める
//! 3. `route`: 各宛先を物理 address にする（endpoint なら distribution strategy を通す）

use std::sync::Arc;

use super::distribution::{DistributionContext, DistributionPolicy, DistributionScope};
use super::error::RoutingError;
use super::instances::EndpointInstances;
use super::table::{UnicastRoute, UnicastRoutingTable};
use crate::domain::{Address, MessageKind, MessageType, OutgoingMessage, SendIntent};
use crate::ports::{MessageConventions, SubscriptionStore};

pub struct Router {
    local_address: Address,
    table: UnicastRoutingTable,
    instances: EndpointInstances,
    policy: DistributionPolicy,
    conventions: Arc<dyn MessageConventions>,
    subscriptions: Option<Arc<dyn SubscriptionStore>>,
}

impl Router {
    pub fn new(local_address: Address, conventions: Arc<dyn MessageConventions>) -> Self {
        Self {
            local_address,
            table: UnicastRoutingTable::new(),
            instances: EndpointInstances::new(),
            policy: DistributionPolicy::new(),
            conventions,
            subscriptions: None,
        }
    }

    pub fn with_routes(mut self, table: UnicastRoutingTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_instances(mut self, instances: EndpointInstances) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_policy(mut self, policy: DistributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn local_address(&self) -> &Address {
        &self.local_address
    }

    /// Logical destinations for `message_type` sent with `intent`.
    ///
    /// A send resolves to exactly one route; a publish to zero or more.
    pub async fn resolve(&self, message_type: &MessageType, intent: SendIntent) -> Result<Vec<UnicastRoute>, RoutingError> {
        let kind = self.conventions.kind_of(message_type);
        let invalid = || RoutingError::InvalidIntent {
            intent,
            kind,
            message_type: message_type.clone(),
        };

        match intent {
            SendIntent::Send => {
                if kind == MessageKind::Event {
                    return Err(invalid());
                }
                let routes = self.table.routes_for(message_type);
                match routes.len() {
                    0 => Err(RoutingError::NoRoute(message_type.clone())),
                    1 => Ok(routes),
                    count => Err(RoutingError::AmbiguousRoute {
                        message_type: message_type.clone(),
                        count,
                    }),
                }
            }
            SendIntent::SendLocal => {
                if kind == MessageKind::Event {
                    return Err(invalid());
                }
                Ok(vec![UnicastRoute::Address(self.local_address.clone())])
            }
            SendIntent::Publish => {
                if kind != MessageKind::Event {
                    return Err(invalid());
                }
                let Some(subscriptions) = &self.subscriptions else {
                    return Ok(Vec::new());
                };
                let mut subscribers = subscriptions.subscribers(message_type).await?;
                subscribers.sort();
                subscribers.dedup();
                Ok(subscribers.into_iter().map(UnicastRoute::Endpoint).collect())
            }
        }
    }

    /// Physical addresses for `message`. Each logical endpoint yields one
    /// instance, picked by the strategy registered for the intent's scope.
    pub async fn route(&self, message: &OutgoingMessage, intent: SendIntent) -> Result<Vec<Address>, RoutingError> {
        let message_type = message
            .message_type()
            .ok_or_else(|| RoutingError::MissingMessageType(message.message_id().to_string()))?;
        let scope = match intent {
            SendIntent::Publish => DistributionScope::Publish,
            SendIntent::Send | SendIntent::SendLocal => DistributionScope::Send,
        };

        let mut addresses = Vec::new();
        for route in self.resolve(&message_type, intent).await? {
            let address = self.physical_address(&route, scope, message)?;
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    fn physical_address(
        &self,
        route: &UnicastRoute,
        scope: DistributionScope,
        message: &OutgoingMessage,
    ) -> Result<Address, RoutingError> {
        match route {
            UnicastRoute::Address(address) => Ok(address.clone()),
            UnicastRoute::Instance(instance) => Ok(instance.transport_address()),
            UnicastRoute::Endpoint(endpoint) => {
                let candidates: Vec<Address> = self
                    .instances
                    .instances_of(endpoint)
                    .iter()
                    .map(|i| i.transport_address())
                    .collect();
                self.policy
                    .select(endpoint, scope, &DistributionContext::new(&candidates, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Headers, headers};
    use crate::impls::{DeclaredConventions, InMemorySubscriptions};
    use crate::routing::{EndpointInstance, PinnedDistribution, RouteTableEntry};

    const PLACE_ORDER: &str = "sales.order.place.v1";
    const ORDER_PLACED: &str = "sales.order.placed.v1";

    fn conventions() -> Arc<DeclaredConventions> {
        let mut c = DeclaredConventions::new();
        c.declare(MessageType::new(PLACE_ORDER), MessageKind::Command);
        c.declare(MessageType::new(ORDER_PLACED), MessageKind::Event);
        Arc::new(c)
    }

    fn message(id: &str, message_type: &str) -> OutgoingMessage {
        let mut h = Headers::new();
        h.insert(headers::MESSAGE_TYPE.to_string(), message_type.to_string());
        OutgoingMessage::new(id, h, Vec::new())
    }

    fn table(routes: &[(&str, UnicastRoute)]) -> UnicastRoutingTable {
        let mut table = UnicastRoutingTable::new();
        table.add_or_replace_routes(
            "test",
            routes
                .iter()
                .map(|(t, r)| RouteTableEntry::new(MessageType::new(*t), r.clone()))
                .collect(),
        );
        table
    }

    #[tokio::test]
    async fn send_without_route_fails() {
        let router = Router::new(Address::new("client"), conventions());

        let err = router.resolve(&MessageType::new(PLACE_ORDER), SendIntent::Send).await.unwrap_err();
        assert!(matches!(err, RoutingError::NoRoute(_)));
    }

    #[tokio::test]
    async fn send_with_two_routes_is_ambiguous() {
        let router = Router::new(Address::new("client"), conventions()).with_routes(table(&[
            (PLACE_ORDER, UnicastRoute::Endpoint("sales".into())),
            (PLACE_ORDER, UnicastRoute::Endpoint("legacy-sales".into())),
        ]));

        let err = router.resolve(&MessageType::new(PLACE_ORDER), SendIntent::Send).await.unwrap_err();
        assert!(matches!(err, RoutingError::AmbiguousRoute { count: 2, .. }));
    }

    #[tokio::test]
    async fn events_cannot_be_sent_and_commands_cannot_be_published() {
        let router = Router::new(Address::new("client"), conventions());

        let send = router.resolve(&MessageType::new(ORDER_PLACED), SendIntent::Send).await;
        assert!(matches!(send, Err(RoutingError::InvalidIntent { kind: MessageKind::Event, .. })));

        let publish = router.resolve(&MessageType::new(PLACE_ORDER), SendIntent::Publish).await;
        assert!(matches!(publish, Err(RoutingError::InvalidIntent { kind: MessageKind::Command, .. })));
    }

    #[tokio::test]
    async fn send_local_targets_own_queue() {
        let router = Router::new(Address::new("client"), conventions());

        let addresses = router.route(&message("msg-1", PLACE_ORDER), SendIntent::SendLocal).await.unwrap();
        assert_eq!(addresses, vec![Address::new("client")]);
    }

    #[tokio::test]
    async fn pinned_strategy_sends_every_message_to_one_instance() {
        let mut instances = EndpointInstances::new();
        instances.add_or_replace_instances(
            "test",
            vec![
                EndpointInstance::new("sales").with_discriminator("XYZ"),
                EndpointInstance::new("sales").with_discriminator("ABC"),
            ],
        );
        let mut policy = DistributionPolicy::new();
        policy.set_distribution_strategy(Arc::new(PinnedDistribution::new("sales", "XYZ", DistributionScope::Send)));

        let router = Router::new(Address::new("client"), conventions())
            .with_routes(table(&[(PLACE_ORDER, UnicastRoute::Endpoint("sales".into()))]))
            .with_instances(instances)
            .with_policy(policy);

        for i in 0..4 {
            let addresses = router
                .route(&message(&format!("msg-{i}"), PLACE_ORDER), SendIntent::Send)
                .await
                .unwrap();
            assert_eq!(addresses, vec![Address::new("sales-XYZ")]);
        }
    }

    #[tokio::test]
    async fn publish_reaches_current_subscribers_only() {
        let subscriptions = Arc::new(InMemorySubscriptions::new());
        subscriptions.subscribe(MessageType::new(ORDER_PLACED), "billing").await;
        subscriptions.subscribe(MessageType::new(ORDER_PLACED), "shipping").await;
        subscriptions.unsubscribe(&MessageType::new(ORDER_PLACED), "shipping").await;

        let router = Router::new(Address::new("sales"), conventions()).with_subscriptions(subscriptions);

        let addresses = router.route(&message("msg-1", ORDER_PLACED), SendIntent::Publish).await.unwrap();
        assert_eq!(addresses, vec![Address::new("billing")]);
    }

    #[tokio::test]
    async fn publish_without_subscription_store_has_no_destinations() {
        let router = Router::new(Address::new("sales"), conventions());

        let addresses = router.route(&message("msg-1", ORDER_PLACED), SendIntent::Publish).await.unwrap();
        assert!(addresses.is_empty());
    }
}
