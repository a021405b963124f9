//! Shared unit-test fixtures.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;

use crate::domain::{Address, Headers, IncomingMessage, OutgoingMessage, StoreError, headers};
use crate::impls::DeclaredConventions;
use crate::pipeline::{EnlistTerminator, IncomingContext, OutgoingServices, PipelineBuilder, RoutingStage, Step};
use crate::ports::{FixedClock, TransactionContext, UlidGenerator};
use crate::recoverability::MarkAsAcknowledged;
use crate::routing::Router;

/// Records enlisted operations instead of writing them anywhere.
#[derive(Default)]
pub struct RecordingTransaction {
    enlisted: Mutex<Vec<(OutgoingMessage, Address)>>,
}

impl RecordingTransaction {
    pub fn enlisted(&self) -> Vec<(OutgoingMessage, Address)> {
        self.enlisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionContext for RecordingTransaction {
    async fn enlist(&self, message: &OutgoingMessage, destination: &Address) -> Result<(), StoreError> {
        self.enlisted.lock().unwrap().push((message.clone(), destination.clone()));
        Ok(())
    }

    async fn clear_pending_outgoing_operations(&self) -> Result<(), StoreError> {
        self.enlisted.lock().unwrap().clear();
        Ok(())
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn incoming(id: &str, message_type: &str, body: &[u8]) -> IncomingMessage {
    let mut h = Headers::new();
    h.insert(headers::MESSAGE_ID.to_string(), id.to_string());
    h.insert(headers::MESSAGE_TYPE.to_string(), message_type.to_string());
    IncomingMessage::new(id, h, body.to_vec())
}

pub fn with_headers(message: IncomingMessage, extra: &[(&str, &str)]) -> IncomingMessage {
    let mut h = message.headers().clone();
    for (k, v) in extra {
        h.insert(k.to_string(), v.to_string());
    }
    IncomingMessage::new(message.message_id(), h, message.body().to_vec())
}

pub fn outgoing(id: &str) -> OutgoingMessage {
    let mut h = Headers::new();
    h.insert(headers::MESSAGE_TYPE.to_string(), "test.message.v1".to_string());
    OutgoingMessage::new(id, h, Vec::new())
}

/// Outgoing services for endpoint "test-endpoint" with a fixed clock and
/// the standard routing behaviors.
pub fn services(router: Router) -> Arc<OutgoingServices> {
    let mut routing = PipelineBuilder::new();
    routing
        .register(Step::new(MarkAsAcknowledged::STEP_ID, RoutingStage::Routing, MarkAsAcknowledged))
        .unwrap();
    let clock = FixedClock::new(now());
    Arc::new(OutgoingServices::new(
        Arc::new(routing.build(EnlistTerminator).unwrap()),
        Arc::new(router),
        Arc::new(UlidGenerator::new(clock)),
        Arc::new(clock),
        "test-endpoint",
    ))
}

pub fn router() -> Router {
    Router::new(Address::new("test-endpoint"), Arc::new(DeclaredConventions::new()))
}

pub fn incoming_context(message: IncomingMessage) -> (IncomingContext, Arc<RecordingTransaction>) {
    incoming_context_with(message, services(router()))
}

pub fn incoming_context_with(
    message: IncomingMessage,
    services: Arc<OutgoingServices>,
) -> (IncomingContext, Arc<RecordingTransaction>) {
    let tx = Arc::new(RecordingTransaction::default());
    let (_cancel, cancellation) = watch::channel(false);
    let ctx = IncomingContext::new(message, tx.clone(), services, cancellation);
    (ctx, tx)
}
