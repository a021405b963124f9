//! EndpointBuilder - エンドポイントの構築とワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - 設定値の検証
//! - `expect_messages()` の型が全部登録されているか
//! - pipeline step の順序制約（重複・未知の参照・循環）
//!
//! どれかが駄目なら何も受信する前に `BuildError` を返します。

use std::sync::Arc;

use super::config::EndpointConfig;
use super::endpoint::Endpoint;
use super::handler::InvokeHandlers;
use super::pump::MessagePump;
use crate::error::BuildError;
use crate::impls::{DeclaredConventions, TracingEventSink};
use crate::pipeline::{
    EnlistTerminator, IncomingContext, IncomingStage, OutgoingServices, PipelineBuilder, RoutingContext,
    RoutingStage, Step,
};
use crate::ports::{Clock, EventSink, IdGenerator, SubscriptionStore, SystemClock, UlidGenerator};
use crate::recoverability::{FailureInfoStorage, ManualRetryAcknowledgement, MarkAsAcknowledged};
use crate::routing::{
    DistributionPolicy, DistributionStrategy, EndpointInstance, EndpointInstances, RouteTableEntry, Router,
    UnicastRoute, UnicastRoutingTable,
};
use crate::store::QueueStore;
use crate::typed::{Handler, Message, RegistryError, TypedRegistry};

/// Route source name for routes declared through the builder.
const BUILDER_ROUTES: &str = "endpoint";

/// # 使用例
/// ```ignore
/// let endpoint = EndpointBuilder::new(config)
///     .register::<PlaceOrder, _>(PlaceOrderHandler)?
///     .command::<PlaceOrder>()
///     .route::<ShipOrder>(UnicastRoute::Endpoint("shipping".into()))
///     .expect_messages(&[PlaceOrder::TYPE])
///     .build()?;
/// let workers = endpoint.start().await?;
/// ```
pub struct EndpointBuilder {
    config: EndpointConfig,
    registry: TypedRegistry,
    expected_messages: Option<Vec<String>>,
    conventions: DeclaredConventions,
    routes: Vec<RouteTableEntry>,
    instances: EndpointInstances,
    policy: DistributionPolicy,
    subscriptions: Option<Arc<dyn SubscriptionStore>>,
    incoming_steps: Vec<Step<IncomingContext>>,
    routing_steps: Vec<Step<RoutingContext>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl EndpointBuilder {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            registry: TypedRegistry::new(),
            expected_messages: None,
            conventions: DeclaredConventions::new(),
            routes: Vec::new(),
            instances: EndpointInstances::new(),
            policy: DistributionPolicy::new(),
            subscriptions: None,
            incoming_steps: Vec::new(),
            routing_steps: Vec::new(),
            sink: Arc::new(TracingEventSink),
            clock: Arc::new(SystemClock),
            ids: None,
        }
    }

    pub fn register<M: Message, H: Handler<M> + 'static>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register::<M, H>(handler)?;
        Ok(self)
    }

    pub fn command<M: Message>(mut self) -> Self {
        self.conventions.command::<M>();
        self
    }

    pub fn event<M: Message>(mut self) -> Self {
        self.conventions.event::<M>();
        self
    }

    pub fn route<M: Message>(mut self, route: UnicastRoute) -> Self {
        self.routes.push(RouteTableEntry::new(M::message_type(), route));
        self
    }

    pub fn instances(mut self, source: impl Into<String>, instances: Vec<EndpointInstance>) -> Self {
        self.instances.add_or_replace_instances(source, instances);
        self
    }

    pub fn distribution(mut self, strategy: Arc<dyn DistributionStrategy>) -> Self {
        self.policy.set_distribution_strategy(strategy);
        self
    }

    pub fn subscriptions(mut self, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn incoming_behavior(mut self, step: Step<IncomingContext>) -> Self {
        self.incoming_steps.push(step);
        self
    }

    pub fn routing_behavior(mut self, step: Step<RoutingContext>) -> Self {
        self.routing_steps.push(step);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Message types that must have a handler when `build()` runs.
    pub fn expect_messages(mut self, message_types: &[&str]) -> Self {
        self.expected_messages = Some(message_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Endpoint, BuildError> {
        self.config.validate()?;
        let recoverability = self.config.recoverability()?;

        if let Some(expected) = &self.expected_messages {
            let registered = self.registry.registered_types();
            let missing: Vec<String> = expected.iter().filter(|t| !registered.contains(t)).cloned().collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingMessageTypes(missing));
            }
        }

        let ids = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(self.clock.clone())) as Arc<dyn IdGenerator>,
        };
        let store = QueueStore::new(self.config.storage_root.clone(), ids.clone(), self.sink.clone());

        let mut table = UnicastRoutingTable::new();
        table.add_or_replace_routes(BUILDER_ROUTES, self.routes);
        let mut router = Router::new(self.config.input_address(), Arc::new(self.conventions))
            .with_routes(table)
            .with_instances(self.instances)
            .with_policy(self.policy);
        if let Some(subscriptions) = self.subscriptions {
            router = router.with_subscriptions(subscriptions);
        }

        let mut routing = PipelineBuilder::new();
        routing.register(Step::new(MarkAsAcknowledged::STEP_ID, RoutingStage::Routing, MarkAsAcknowledged))?;
        for step in self.routing_steps {
            routing.register(step)?;
        }
        let outgoing = Arc::new(OutgoingServices::new(
            Arc::new(routing.build(EnlistTerminator)?),
            Arc::new(router),
            ids,
            self.clock,
            self.config.endpoint_name.clone(),
        ));

        let error_queue = self.config.error_address();
        let mut incoming = PipelineBuilder::new();
        incoming.register(Step::new(
            ManualRetryAcknowledgement::STEP_ID,
            IncomingStage::Receive,
            ManualRetryAcknowledgement::new(error_queue.clone(), self.sink.clone()),
        ))?;
        for step in self.incoming_steps {
            incoming.register(step)?;
        }
        let incoming = incoming.build(InvokeHandlers::new(self.registry))?;

        let mut queues = vec![self.config.input_address()];
        queues.extend(self.config.instance_address());

        let pump = MessagePump {
            store: store.clone(),
            queues,
            incoming: Arc::new(incoming),
            outgoing: outgoing.clone(),
            failures: FailureInfoStorage::new(),
            recoverability,
            error_queue,
            poll_interval: self.config.poll_interval(),
            sink: self.sink,
        };
        Ok(Endpoint::new(self.config, store, pump, outgoing))
    }
}
