//! Endpoint - 組み立て済みのエンドポイント
//!
//! `EndpointBuilder::build()` で作ります。起動は `start()`、
//! ハンドラーの外からの送信は `send` / `send_local` / `publish`。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use super::config::EndpointConfig;
use super::pump::{MessagePump, WorkerGroup};
use crate::domain::{Address, OutgoingMessage, SendIntent, StoreError};
use crate::error::PipelineError;
use crate::pipeline::{Extensions, OutgoingServices};
use crate::ports::TransactionContext;
use crate::store::{QueueStore, RecoveryReport, RecoverySweeper};
use crate::typed::Message;

pub struct Endpoint {
    config: EndpointConfig,
    store: QueueStore,
    pump: Arc<MessagePump>,
    outgoing: Arc<OutgoingServices>,
}

impl Endpoint {
    pub(crate) fn new(
        config: EndpointConfig,
        store: QueueStore,
        pump: MessagePump,
        outgoing: Arc<OutgoingServices>,
    ) -> Self {
        Self {
            config,
            store,
            pump: Arc::new(pump),
            outgoing,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Queues this endpoint receives from, shared queue first.
    pub fn input_queues(&self) -> &[Address] {
        &self.pump.queues
    }

    /// Sweep leftover transactions of every input queue.
    pub async fn recover(&self) -> Result<RecoveryReport, StoreError> {
        let sweeper = RecoverySweeper::new(self.store.clone());
        let mut report = RecoveryReport::default();
        for queue in self.input_queues() {
            report += sweeper.sweep(queue).await?;
        }
        Ok(report)
    }

    /// Create the queues, recover, then spawn `concurrency` workers.
    pub async fn start(&self) -> Result<WorkerGroup, StoreError> {
        for queue in self.input_queues() {
            self.store.ensure_queue(queue).await?;
        }
        self.store.ensure_queue(&self.config.error_address()).await?;

        let report = self.recover().await?;
        info!(
            endpoint = %self.config.endpoint_name,
            pending_rolled_back = report.pending_rolled_back,
            committed_completed = report.committed_completed,
            committed_deferred = report.committed_deferred,
            "Recovery finished"
        );

        Ok(WorkerGroup::spawn(self.config.concurrency, Arc::clone(&self.pump)))
    }

    /// Process at most one message on the calling task.
    pub async fn process_one(&self) -> Result<bool, StoreError> {
        let (_never, cancellation) = watch::channel(false);
        self.pump.process_next(&cancellation).await
    }

    pub async fn send<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.dispatch(message, SendIntent::Send).await
    }

    pub async fn send_local<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.dispatch(message, SendIntent::SendLocal).await
    }

    pub async fn publish<M: Message>(&self, message: &M) -> Result<(), PipelineError> {
        self.dispatch(message, SendIntent::Publish).await
    }

    async fn dispatch<M: Message>(&self, message: &M, intent: SendIntent) -> Result<(), PipelineError> {
        let outgoing = self.outgoing.prepare(message, intent, None)?;
        let destinations = self.outgoing.router().route(&outgoing, intent).await?;
        let (_never, cancellation) = watch::channel(false);
        self.outgoing
            .dispatch(
                outgoing,
                destinations,
                Extensions::new(),
                Arc::new(ImmediateDispatch {
                    store: self.store.clone(),
                }),
                cancellation,
            )
            .await
    }
}

/// Outside a receive there is no transaction to join; each operation is
/// delivered as soon as it is enlisted.
struct ImmediateDispatch {
    store: QueueStore,
}

#[async_trait]
impl TransactionContext for ImmediateDispatch {
    async fn enlist(&self, message: &OutgoingMessage, destination: &Address) -> Result<(), StoreError> {
        self.store.deliver(destination, message).await
    }

    async fn clear_pending_outgoing_operations(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
