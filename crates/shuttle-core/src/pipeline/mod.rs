//! Pipeline - behavior の連鎖で 1 つのメッセージを処理する
//!
//! # 構造
//! - `Behavior<C>`: context と「残りの連鎖」(`Next`) を受け取る
//! - `Terminator<C>`: 連鎖の末尾（handler 実行、enlist など）
//! - `Pipeline<C>`: 起動時に順序が確定した behavior の固定リスト
//!
//! behavior は `next.run(ctx)` を 0 回以上呼べます。呼ばなければ
//! short-circuit、エラーを返せば失敗がそのまま上に伝わります。
//!
//! # fork
//! `IncomingContext::fork` は routing pipeline を同期的に（await して）
//! 実行し、同じ TransactionContext に enlist します。

pub mod builder;
pub mod context;
pub mod extensions;

pub use self::builder::{PipelineBuilder, Step};
pub use self::context::{
    EnlistTerminator, IncomingContext, IncomingStage, OutgoingServices, RoutingContext, RoutingStage,
};
pub use self::extensions::Extensions;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;

/// A kind of context a pipeline runs over, together with the stages its
/// behaviors are placed in.
pub trait PipelineContext: Send + 'static {
    type Stage: Copy + Ord + Debug + Send + Sync + 'static;
}

#[async_trait]
pub trait Behavior<C: PipelineContext>: Send + Sync {
    async fn invoke(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait Terminator<C: PipelineContext>: Send + Sync {
    async fn terminate(&self, ctx: &mut C) -> Result<(), PipelineError>;
}

/// The rest of the chain after the current behavior.
pub struct Next<'a, C: PipelineContext> {
    chain: &'a [Arc<dyn Behavior<C>>],
    terminator: &'a dyn Terminator<C>,
}

impl<C: PipelineContext> Clone for Next<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: PipelineContext> Copy for Next<'_, C> {}

impl<C: PipelineContext> Next<'_, C> {
    pub async fn run(self, ctx: &mut C) -> Result<(), PipelineError> {
        match self.chain.split_first() {
            Some((behavior, rest)) => {
                let next = Next {
                    chain: rest,
                    terminator: self.terminator,
                };
                behavior.invoke(ctx, next).await
            }
            None => self.terminator.terminate(ctx).await,
        }
    }
}

pub struct Pipeline<C: PipelineContext> {
    ids: Vec<String>,
    chain: Vec<Arc<dyn Behavior<C>>>,
    terminator: Arc<dyn Terminator<C>>,
}

impl<C: PipelineContext> Pipeline<C> {
    pub async fn invoke(&self, ctx: &mut C) -> Result<(), PipelineError> {
        Next {
            chain: &self.chain,
            terminator: self.terminator.as_ref(),
        }
        .run(ctx)
        .await
    }

    /// Step ids in execution order.
    pub fn step_ids(&self) -> &[String] {
        &self.ids
    }
}
