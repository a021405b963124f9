//! Message pump - claim → pipeline → commit/complete or rollback
//!
//! # 1 件の処理
//! 1. input queue から claim（LocalTransaction が始まる）
//! 2. incoming pipeline を実行
//! 3. 成功 → commit → complete
//! 4. cancel → 送信を破棄して rollback
//! 5. 失敗 → immediate retry の上限内なら rollback（もう一度 claim される）、
//!    超えたら error queue へ転送して commit → complete

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{Address, StoreError, TransportEvent};
use crate::error::PipelineError;
use crate::pipeline::{IncomingContext, OutgoingServices, Pipeline};
use crate::ports::EventSink;
use crate::recoverability::{FailureInfoStorage, RecoverabilityConfig, forward_to_error_queue};
use crate::store::{ClaimedMessage, QueueStore, SharedTransaction};

/// Worker group handle.
/// - `request_shutdown()` で新しい claim を止める
/// - `shutdown_and_join()` で全ワーカーの終了を待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub(crate) fn spawn(n: usize, pump: Arc<MessagePump>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let pump = Arc::clone(&pump);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, pump, rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// In-flight messages observe the signal; whatever they enlisted is
    /// discarded and the message is rolled back.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(worker_id: usize, pump: Arc<MessagePump>, mut shutdown_rx: watch::Receiver<bool>) {
    debug!(worker_id, "Worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match pump.process_next(&shutdown_rx).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => warn!(worker_id, error = %e, "Receive failed"),
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(pump.poll_interval) => {}
        }
    }
    debug!(worker_id, "Worker stopped");
}

pub(crate) struct MessagePump {
    pub(crate) store: QueueStore,
    pub(crate) queues: Vec<Address>,
    pub(crate) incoming: Arc<Pipeline<IncomingContext>>,
    pub(crate) outgoing: Arc<OutgoingServices>,
    pub(crate) failures: FailureInfoStorage,
    pub(crate) recoverability: RecoverabilityConfig,
    pub(crate) error_queue: Address,
    pub(crate) poll_interval: Duration,
    pub(crate) sink: Arc<dyn EventSink>,
}

impl MessagePump {
    /// Claim and process at most one message. `Ok(false)` when every
    /// input queue is empty.
    pub(crate) async fn process_next(&self, shutdown: &watch::Receiver<bool>) -> Result<bool, StoreError> {
        for queue in &self.queues {
            if let Some(claimed) = self.store.claim(queue).await? {
                self.process(queue, claimed, shutdown.clone()).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn process(
        &self,
        queue: &Address,
        claimed: ClaimedMessage,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), StoreError> {
        let ClaimedMessage { transaction, message } = claimed;
        let message_id = message.message_id().to_string();
        let transaction = SharedTransaction::new(transaction);
        let mut ctx = IncomingContext::new(message, Arc::new(transaction.clone()), self.outgoing.clone(), shutdown);

        let error = match self.incoming.invoke(&mut ctx).await {
            Ok(()) => {
                self.failures.clear(&message_id).await;
                return finish(&transaction).await;
            }
            Err(PipelineError::Cancelled) => return abort(&transaction).await,
            Err(error) => error,
        };

        let attempts = self.failures.record_failure(&message_id).await;
        self.sink.emit(TransportEvent::ProcessingFailed {
            message_id: message_id.clone(),
            attempts,
            error: error.to_string(),
        });
        if attempts <= self.recoverability.immediate.max_retries() {
            return abort(&transaction).await;
        }

        match forward_to_error_queue(&mut ctx, queue, &self.error_queue, &error, attempts).await {
            Ok(()) => {
                self.failures.clear(&message_id).await;
                finish(&transaction).await?;
                self.sink.emit(TransportEvent::ForwardedToErrorQueue {
                    message_id,
                    error_queue: self.error_queue.clone(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(%message_id, error = %e, "Could not forward to error queue");
                abort(&transaction).await
            }
        }
    }
}

async fn finish(transaction: &SharedTransaction) -> Result<(), StoreError> {
    let mut tx = transaction.lock().await;
    tx.commit().await?;
    tx.complete().await?;
    Ok(())
}

/// Roll back; the staging dir goes away with every enlisted operation.
async fn abort(transaction: &SharedTransaction) -> Result<(), StoreError> {
    transaction.lock().await.rollback().await
}
