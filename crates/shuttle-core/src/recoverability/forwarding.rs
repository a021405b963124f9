//! Failure counting and error-queue forwarding.

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::manual_retry::ForwardingToErrorQueue;
use crate::domain::{Address, OutgoingMessage, headers};
use crate::error::PipelineError;
use crate::pipeline::IncomingContext;

/// Failed attempts per message id, kept in memory only.
#[derive(Debug, Default)]
pub struct FailureInfoStorage {
    attempts: Mutex<HashMap<String, u32>>,
}

impl FailureInfoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failure and return the total so far.
    pub async fn record_failure(&self, message_id: &str) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let count = attempts.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub async fn clear(&self, message_id: &str) {
        self.attempts.lock().await.remove(message_id);
    }
}

/// Replace whatever the failed attempt enlisted with one copy of the
/// inbound message addressed to `error_queue`, in the same transaction.
pub async fn forward_to_error_queue(
    ctx: &mut IncomingContext,
    failed_queue: &Address,
    error_queue: &Address,
    error: &PipelineError,
    attempts: u32,
) -> Result<(), PipelineError> {
    ctx.transaction().clear_pending_outgoing_operations().await?;

    let incoming = ctx.message();
    let mut copy = OutgoingMessage::new(incoming.message_id(), incoming.headers().clone(), incoming.body().to_vec());
    copy.set_header(headers::FAILED_QUEUE, failed_queue.as_str());
    copy.set_header(headers::EXCEPTION_MESSAGE, error.to_string());
    copy.set_header(headers::PROCESSING_ATTEMPTS, attempts.to_string());

    ctx.extensions_mut().set(ForwardingToErrorQueue);
    ctx.fork(copy, vec![error_queue.clone()]).await
}
