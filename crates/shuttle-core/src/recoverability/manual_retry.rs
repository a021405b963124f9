//! Manual retry acknowledgement
//!
//! 外部の retry ツールから再送されたメッセージは、処理に成功したら
//! coordinator queue に確認メッセージ（control message）を返します。
//!
//! # 条件
//! `Retry.UniqueMessageId` と `Retry.ToolVersion` の両方がある場合だけ。
//! version header が無い古いツールは確認メッセージを理解しません。
//!
//! # 失敗時
//! 後続が失敗したら確認は送らず、エラーをそのまま返します
//! （通常の retry / error queue の処理に任せる）。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Address, Headers, IncomingMessage, OutgoingMessage, TransportEvent, headers};
use crate::error::PipelineError;
use crate::pipeline::{Behavior, IncomingContext, Next, OutgoingServices, RoutingContext};
use crate::ports::EventSink;

/// Ambient flag set on messages that came from an acknowledging retry tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAcknowledgementState {
    pub retry_id: String,
}

/// Set while the failed message is being forwarded to the error queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingToErrorQueue;

pub struct ManualRetryAcknowledgement {
    coordinator: Address,
    sink: Arc<dyn EventSink>,
}

impl ManualRetryAcknowledgement {
    pub const STEP_ID: &'static str = "ManualRetryAcknowledgement";

    pub fn new(coordinator: Address, sink: Arc<dyn EventSink>) -> Self {
        Self { coordinator, sink }
    }
}

fn retry_id_of(message: &IncomingMessage) -> Option<String> {
    let retry_id = message.header(headers::RETRY_UNIQUE_MESSAGE_ID)?;
    message.header(headers::RETRY_TOOL_VERSION)?;
    Some(retry_id.to_string())
}

fn acknowledgement(services: &OutgoingServices, retry_id: &str) -> OutgoingMessage {
    let mut h = Headers::new();
    h.insert(headers::RETRY_SUCCESSFUL.to_string(), services.clock().now().to_rfc3339());
    h.insert(headers::RETRY_UNIQUE_MESSAGE_ID.to_string(), retry_id.to_string());
    h.insert(headers::CONTROL_MESSAGE.to_string(), headers::TRUE.to_string());
    OutgoingMessage::new(services.ids().generate_message_id().to_string(), h, Vec::new())
}

#[async_trait]
impl Behavior<IncomingContext> for ManualRetryAcknowledgement {
    async fn invoke(&self, ctx: &mut IncomingContext, next: Next<'_, IncomingContext>) -> Result<(), PipelineError> {
        let retry_id = retry_id_of(ctx.message());
        if let Some(retry_id) = &retry_id {
            ctx.extensions_mut().set(RetryAcknowledgementState {
                retry_id: retry_id.clone(),
            });
        }

        next.run(ctx).await?;

        let Some(retry_id) = retry_id else {
            return Ok(());
        };
        // type routing を通さず coordinator へ直接
        let ack = acknowledgement(ctx.outgoing(), &retry_id);
        ctx.fork(ack, vec![self.coordinator.clone()]).await?;

        self.sink.emit(TransportEvent::RetryAcknowledged {
            retry_id,
            coordinator: self.coordinator.clone(),
        });
        Ok(())
    }
}

/// Flags an error-queue copy of an acknowledging retry so the retry tool
/// does not wait for a separate confirmation.
pub struct MarkAsAcknowledged;

impl MarkAsAcknowledged {
    pub const STEP_ID: &'static str = "MarkAsAcknowledged";
}

#[async_trait]
impl Behavior<RoutingContext> for MarkAsAcknowledged {
    async fn invoke(&self, ctx: &mut RoutingContext, next: Next<'_, RoutingContext>) -> Result<(), PipelineError> {
        if ctx.extensions().contains::<RetryAcknowledgementState>()
            && ctx.extensions().contains::<ForwardingToErrorQueue>()
        {
            ctx.message_mut()
                .set_header(headers::RETRY_ACKNOWLEDGEMENT_SENT, headers::TRUE);
        }
        next.run(ctx).await
    }
}
