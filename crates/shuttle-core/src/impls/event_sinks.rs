//! EventSink implementations.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::domain::TransportEvent;
use crate::ports::EventSink;

/// Emits every event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: TransportEvent) {
        match event {
            TransportEvent::MessageClaimed {
                queue,
                message_id,
                transaction_id,
            } => debug!(%queue, %message_id, %transaction_id, "Claimed message"),
            TransportEvent::ClaimMissed { queue, file } => {
                debug!(%queue, file = %file.display(), "Message already taken by a competing consumer")
            }
            TransportEvent::TransactionCommitted {
                transaction_id,
                operations,
            } => debug!(%transaction_id, operations, "Committed transaction"),
            TransportEvent::TransactionCompleted {
                transaction_id,
                delivered,
                failed,
            } => {
                if failed > 0 {
                    warn!(%transaction_id, delivered, failed, "Completed transaction with undelivered operations");
                } else {
                    debug!(%transaction_id, delivered, "Completed transaction");
                }
            }
            TransportEvent::TransactionRolledBack {
                transaction_id,
                discarded,
            } => debug!(%transaction_id, discarded, "Rolled back transaction"),
            TransportEvent::DeliveryFailed {
                transaction_id,
                operation,
                error,
            } => warn!(%transaction_id, %operation, %error, "Delivery failed, left for recovery"),
            TransportEvent::PendingTransactionRecovered {
                queue,
                transaction,
                restored,
            } => info!(%queue, %transaction, restored, "Recovered pending transaction"),
            TransportEvent::CommittedTransactionRecovered {
                queue,
                transaction,
                redelivered,
            } => info!(%queue, %transaction, redelivered, "Recovered committed transaction"),
            TransportEvent::RecoveryStepFailed { path, error } => debug!(
                path = %path.display(),
                %error,
                "Recovery step failed, assumed resolved by a competing consumer"
            ),
            TransportEvent::ProcessingFailed {
                message_id,
                attempts,
                error,
            } => warn!(%message_id, attempts, %error, "Message processing failed"),
            TransportEvent::ForwardedToErrorQueue {
                message_id,
                error_queue,
            } => warn!(%message_id, %error_queue, "Moved message to error queue"),
            TransportEvent::RetryAcknowledged {
                retry_id,
                coordinator,
            } => info!(%retry_id, %coordinator, "Acknowledged manual retry"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TransportEvent) {}
}

/// Keeps every event in memory. Meant for tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<TransportEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: TransportEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
