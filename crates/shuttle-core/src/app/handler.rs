//! InvokeHandlers - incoming pipeline の末尾
//!
//! message type header で registry から handler を引いて実行します。
//! handler の無い control message は何もせずに消費します。

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::pipeline::{IncomingContext, Terminator};
use crate::typed::TypedRegistry;

pub struct InvokeHandlers {
    registry: TypedRegistry,
}

impl InvokeHandlers {
    pub fn new(registry: TypedRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Terminator<IncomingContext> for InvokeHandlers {
    async fn terminate(&self, ctx: &mut IncomingContext) -> Result<(), PipelineError> {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let ctx: &IncomingContext = ctx;
        let message = ctx.message();
        let control = message.is_control_message();

        let Some(message_type) = message.message_type() else {
            if control {
                return Ok(());
            }
            return Err(PipelineError::MissingMessageType(message.message_id().to_string()));
        };

        match self.registry.get(message_type.as_str()) {
            Some(handler) => handler.handle_dyn(message.body(), ctx).await,
            None if control => Ok(()),
            None => Err(PipelineError::NoHandler(message_type)),
        }
    }
}
