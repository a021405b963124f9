//! Contexts for the incoming (receive) and routing (outgoing) pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{Extensions, Pipeline, PipelineContext, Terminator};
use crate::domain::{Address, IncomingMessage, OutgoingMessage, SendIntent, headers};
use crate::error::PipelineError;
use crate::ports::{Clock, IdGenerator, TransactionContext};
use crate::routing::Router;
use crate::typed::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IncomingStage {
    /// Raw transport message, before anything is decoded.
    Receive,
    Physical,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoutingStage {
    Routing,
    Dispatch,
}

/// Everything needed to turn a typed message into routed, enlisted
/// outgoing operations. Shared by all contexts of one endpoint.
pub struct OutgoingServices {
    routing: Arc<Pipeline<RoutingContext>>,
    router: Arc<Router>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    endpoint_name: String,
}

impl OutgoingServices {
    pub fn new(
        routing: Arc<Pipeline<RoutingContext>>,
        router: Arc<Router>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        endpoint_name: impl Into<String>,
    ) -> Self {
        Self {
            routing,
            router,
            ids,
            clock,
            endpoint_name: endpoint_name.into(),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn ids(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Serialize `message` and stamp the standard headers.
    ///
    /// When sent while handling `incoming`, the conversation is inherited
    /// and the new message is related to the inbound one.
    pub fn prepare<M: Message>(
        &self,
        message: &M,
        intent: SendIntent,
        incoming: Option<&IncomingMessage>,
    ) -> Result<OutgoingMessage, PipelineError> {
        let body = serde_json::to_vec(message).map_err(|e| PipelineError::Encode(e.to_string()))?;
        let message_id = self.ids.generate_message_id().to_string();

        let mut outgoing = OutgoingMessage::new(message_id.clone(), Default::default(), body);
        outgoing.set_header(headers::MESSAGE_TYPE, M::TYPE);
        outgoing.set_header(headers::MESSAGE_INTENT, intent.as_str());
        outgoing.set_header(headers::ORIGINATING_ENDPOINT, self.endpoint_name.clone());
        outgoing.set_header(headers::TIME_SENT, self.clock.now().to_rfc3339());

        let conversation = incoming
            .and_then(|m| m.header(headers::CONVERSATION_ID))
            .map(str::to_string)
            .unwrap_or(message_id);
        outgoing.set_header(headers::CONVERSATION_ID, conversation);
        if let Some(incoming) = incoming {
            outgoing.set_header(headers::RELATED_TO, incoming.message_id());
        }
        Ok(outgoing)
    }

    /// Run the routing pipeline for `message` bound to `transaction`.
    pub async fn dispatch(
        &self,
        message: OutgoingMessage,
        destinations: Vec<Address>,
        extensions: Extensions,
        transaction: Arc<dyn TransactionContext>,
        cancellation: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let mut ctx = RoutingContext {
            message,
            destinations,
            extensions,
            transaction,
            cancellation,
        };
        self.routing.invoke(&mut ctx).await
    }
}

/// Context of one inbound message being processed.
pub struct IncomingContext {
    message: IncomingMessage,
    extensions: Extensions,
    transaction: Arc<dyn TransactionContext>,
    outgoing: Arc<OutgoingServices>,
    cancellation: watch::Receiver<bool>,
}

impl PipelineContext for IncomingContext {
    type Stage = IncomingStage;
}

impl IncomingContext {
    pub fn new(
        message: IncomingMessage,
        transaction: Arc<dyn TransactionContext>,
        outgoing: Arc<OutgoingServices>,
        cancellation: watch::Receiver<bool>,
    ) -> Self {
        Self {
            message,
            extensions: Extensions::new(),
            transaction,
            outgoing,
            cancellation,
        }
    }

    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn transaction(&self) -> &Arc<dyn TransactionContext> {
        &self.transaction
    }

    pub fn outgoing(&self) -> &OutgoingServices {
        &self.outgoing
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancellation.borrow()
    }

    /// Run the routing pipeline for `message` to completion. Whatever it
    /// enlists shares this context's transaction.
    pub async fn fork(&self, message: OutgoingMessage, destinations: Vec<Address>) -> Result<(), PipelineError> {
        self.outgoing
            .dispatch(
                message,
                destinations,
                self.extensions.fork(),
                self.transaction.clone(),
                self.cancellation.clone(),
            )
            .await
    }

    pub async fn send<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.route_and_fork(message, SendIntent::Send).await
    }

    pub async fn send_local<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.route_and_fork(message, SendIntent::SendLocal).await
    }

    pub async fn publish<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.route_and_fork(message, SendIntent::Publish).await
    }

    async fn route_and_fork<M: Message>(&self, message: &M, intent: SendIntent) -> Result<(), PipelineError> {
        let outgoing = self.outgoing.prepare(message, intent, Some(&self.message))?;
        let destinations = self.outgoing.router.route(&outgoing, intent).await?;
        self.fork(outgoing, destinations).await
    }
}

/// Context of one outgoing message on its way to the transaction.
pub struct RoutingContext {
    message: OutgoingMessage,
    destinations: Vec<Address>,
    extensions: Extensions,
    transaction: Arc<dyn TransactionContext>,
    cancellation: watch::Receiver<bool>,
}

impl PipelineContext for RoutingContext {
    type Stage = RoutingStage;
}

impl RoutingContext {
    pub fn message(&self) -> &OutgoingMessage {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut OutgoingMessage {
        &mut self.message
    }

    pub fn destinations(&self) -> &[Address] {
        &self.destinations
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancellation.borrow()
    }
}

/// End of the routing pipeline: stage the message for every destination.
pub struct EnlistTerminator;

#[async_trait]
impl Terminator<RoutingContext> for EnlistTerminator {
    async fn terminate(&self, ctx: &mut RoutingContext) -> Result<(), PipelineError> {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        for destination in &ctx.destinations {
            ctx.transaction.enlist(&ctx.message, destination).await?;
        }
        Ok(())
    }
}
