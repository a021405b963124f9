//! Handler trait - 型付き Message を処理する Handler
//!
//! - `Handler<M>`: 型付き（表層）
//! - `DynHandler`: object-safe（registry に格納する内部用）
//! - `TypedHandler<M, H>`: body を decode して `Handler<M>` に渡す

use std::marker::PhantomData;

use async_trait::async_trait;

use super::message::Message;
use crate::error::PipelineError;
use crate::pipeline::IncomingContext;

/// Handler は decode 済みの Message を受け取る
///
/// `ctx` から send / publish / send_local すると、処理中のメッセージと
/// 同じトランザクションに enlist されます。
#[async_trait]
pub trait Handler<M: Message>: Send + Sync {
    async fn handle(&self, message: M, ctx: &IncomingContext) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, body: &[u8], ctx: &IncomingContext) -> Result<(), PipelineError>;

    fn message_type(&self) -> &str;
}

pub struct TypedHandler<M: Message, H: Handler<M>> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Message, H: Handler<M>> TypedHandler<M, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Message, H: Handler<M>> DynHandler for TypedHandler<M, H> {
    async fn handle_dyn(&self, body: &[u8], ctx: &IncomingContext) -> Result<(), PipelineError> {
        let message: M = serde_json::from_slice(body).map_err(|e| PipelineError::Decode(format!("{}: {e}", M::TYPE)))?;
        self.handler.handle(message, ctx).await
    }

    fn message_type(&self) -> &str {
        M::TYPE
    }
}
