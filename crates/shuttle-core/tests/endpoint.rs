//! Endpoint end to end over a temporary queue root.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shuttle_core::domain::{Headers, IncomingMessage, OutgoingMessage, TransportEvent, headers};
use shuttle_core::impls::{InMemorySubscriptions, RecordingEventSink};
use shuttle_core::pipeline::IncomingContext;
use shuttle_core::routing::{DistributionScope, EndpointInstance, PinnedDistribution, UnicastRoute};
use shuttle_core::{Address, EndpointBuilder, EndpointConfig, Handler, Message, PipelineError, QueueStore};
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize)]
struct PlaceOrder {
    order_id: String,
}

impl Message for PlaceOrder {
    const TYPE: &'static str = "sales.order.place.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct BillOrder {
    order_id: String,
}

impl Message for BillOrder {
    const TYPE: &'static str = "billing.order.bill.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
}

impl Message for OrderPlaced {
    const TYPE: &'static str = "sales.order.placed.v1";
}

/// Sends a `BillOrder`, then fails while `failures` is above zero.
struct PlaceOrderHandler {
    failures: AtomicUsize,
    handled: AtomicUsize,
}

impl PlaceOrderHandler {
    fn failing(n: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(n),
            handled: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Handler<PlaceOrder> for Arc<PlaceOrderHandler> {
    async fn handle(&self, message: PlaceOrder, ctx: &IncomingContext) -> Result<(), PipelineError> {
        ctx.send(&BillOrder {
            order_id: message.order_id,
        })
        .await?;
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PipelineError::handler("payment service unavailable"));
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(dir: &TempDir, max_retries: i32) -> EndpointConfig {
    let mut config = EndpointConfig::new("sales", dir.path());
    config.recoverability.immediate.max_retries = max_retries;
    config.poll_interval_ms = 10;
    config
}

fn builder(dir: &TempDir, max_retries: i32, handler: Arc<PlaceOrderHandler>) -> EndpointBuilder {
    EndpointBuilder::new(config(dir, max_retries))
        .register::<PlaceOrder, _>(handler)
        .unwrap()
        .command::<PlaceOrder>()
        .command::<BillOrder>()
        .route::<BillOrder>(UnicastRoute::Endpoint("billing".to_string()))
}

fn inbound(id: &str, extra: &[(&str, &str)]) -> OutgoingMessage {
    let mut h = Headers::new();
    h.insert(headers::MESSAGE_TYPE.to_string(), PlaceOrder::TYPE.to_string());
    for (k, v) in extra {
        h.insert(k.to_string(), v.to_string());
    }
    OutgoingMessage::new(id, h, br#"{"order_id":"o-1"}"#.to_vec())
}

async fn drain(store: &QueueStore, queue: &str) -> Vec<IncomingMessage> {
    let mut out = Vec::new();
    while let Some(mut claimed) = store.claim(&Address::new(queue)).await.unwrap() {
        claimed.transaction.commit().await.unwrap();
        claimed.transaction.complete().await.unwrap();
        out.push(claimed.message);
    }
    out
}

#[tokio::test]
async fn handler_output_becomes_visible_when_the_receive_completes() {
    let dir = TempDir::new().unwrap();
    let handler = PlaceOrderHandler::failing(0);
    let endpoint = builder(&dir, 0, handler.clone()).build().unwrap();
    endpoint.store().deliver(&Address::new("sales"), &inbound("msg-1", &[])).await.unwrap();

    assert!(endpoint.process_one().await.unwrap());
    assert!(!endpoint.process_one().await.unwrap());

    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    let billed = drain(endpoint.store(), "billing").await;
    assert_eq!(billed.len(), 1);
    assert_eq!(billed[0].header(headers::MESSAGE_TYPE), Some(BillOrder::TYPE));
    assert_eq!(billed[0].header(headers::RELATED_TO), Some("msg-1"));
    assert_eq!(billed[0].header(headers::ORIGINATING_ENDPOINT), Some("sales"));
    assert_eq!(billed[0].body(), br#"{"order_id":"o-1"}"#);
}

#[tokio::test]
async fn immediate_retry_then_error_queue() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let endpoint = builder(&dir, 1, PlaceOrderHandler::failing(usize::MAX))
        .event_sink(sink.clone())
        .build()
        .unwrap();
    endpoint.store().deliver(&Address::new("sales"), &inbound("msg-1", &[])).await.unwrap();

    // 1 回目: rollback されて queue に戻る
    assert!(endpoint.process_one().await.unwrap());
    assert_eq!(endpoint.store().counts(&Address::new("sales")).await.unwrap().ready, 1);
    assert_eq!(endpoint.store().counts(&Address::new("error")).await.unwrap().ready, 0);

    // 2 回目: 上限を超えたので error queue へ
    assert!(endpoint.process_one().await.unwrap());
    assert_eq!(endpoint.store().counts(&Address::new("sales")).await.unwrap().ready, 0);

    let failed = drain(endpoint.store(), "error").await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].message_id(), "msg-1");
    assert_eq!(failed[0].header(headers::FAILED_QUEUE), Some("sales"));
    assert_eq!(failed[0].header(headers::PROCESSING_ATTEMPTS), Some("2"));
    assert!(failed[0].header(headers::EXCEPTION_MESSAGE).unwrap().contains("payment service unavailable"));

    // 失敗した試行の送信は一度も見えない
    assert!(drain(endpoint.store(), "billing").await.is_empty());
    assert!(sink.events().iter().any(|e| matches!(
        e,
        TransportEvent::ForwardedToErrorQueue { message_id, .. } if message_id == "msg-1"
    )));
}

#[tokio::test]
async fn successful_retry_is_acknowledged_to_the_coordinator() {
    let dir = TempDir::new().unwrap();
    let endpoint = builder(&dir, 0, PlaceOrderHandler::failing(0)).build().unwrap();
    let retried = inbound(
        "msg-1",
        &[(headers::RETRY_UNIQUE_MESSAGE_ID, "retry-42"), (headers::RETRY_TOOL_VERSION, "1.0")],
    );
    endpoint.store().deliver(&Address::new("sales"), &retried).await.unwrap();

    assert!(endpoint.process_one().await.unwrap());

    let acks = drain(endpoint.store(), "error").await;
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].header(headers::RETRY_UNIQUE_MESSAGE_ID), Some("retry-42"));
    assert_eq!(acks[0].header(headers::CONTROL_MESSAGE), Some("true"));
    assert!(acks[0].header(headers::RETRY_SUCCESSFUL).is_some());
    assert!(acks[0].body().is_empty());
    assert_eq!(drain(endpoint.store(), "billing").await.len(), 1);
}

#[tokio::test]
async fn failed_retry_is_forwarded_marked_as_acknowledged() {
    let dir = TempDir::new().unwrap();
    let endpoint = builder(&dir, 0, PlaceOrderHandler::failing(usize::MAX)).build().unwrap();
    let retried = inbound(
        "msg-1",
        &[(headers::RETRY_UNIQUE_MESSAGE_ID, "retry-42"), (headers::RETRY_TOOL_VERSION, "1.0")],
    );
    endpoint.store().deliver(&Address::new("sales"), &retried).await.unwrap();

    assert!(endpoint.process_one().await.unwrap());

    let failed = drain(endpoint.store(), "error").await;
    assert_eq!(failed.len(), 1, "only the forwarded copy, no acknowledgement");
    assert_eq!(failed[0].message_id(), "msg-1");
    assert_eq!(failed[0].header(headers::RETRY_ACKNOWLEDGEMENT_SENT), Some("true"));
    assert_eq!(failed[0].header(headers::CONTROL_MESSAGE), None);
}

#[tokio::test]
async fn pinned_distribution_sends_every_message_to_one_instance() {
    let dir = TempDir::new().unwrap();
    let endpoint = EndpointBuilder::new(config(&dir, 0))
        .command::<BillOrder>()
        .route::<BillOrder>(UnicastRoute::Endpoint("billing".to_string()))
        .instances(
            "billing-deployment",
            ["X", "Y", "Z"]
                .into_iter()
                .map(|d| EndpointInstance::new("billing").with_discriminator(d))
                .collect(),
        )
        .distribution(Arc::new(PinnedDistribution::new("billing", "Y", DistributionScope::Send)))
        .build()
        .unwrap();

    for i in 0..4 {
        endpoint
            .send(&BillOrder {
                order_id: format!("o-{i}"),
            })
            .await
            .unwrap();
    }

    assert_eq!(endpoint.store().counts(&Address::new("billing-Y")).await.unwrap().ready, 4);
    for other in ["billing-X", "billing-Z", "billing"] {
        assert_eq!(endpoint.store().counts(&Address::new(other)).await.unwrap().ready, 0);
    }
}

#[tokio::test]
async fn publish_reaches_current_subscribers_only() {
    let dir = TempDir::new().unwrap();
    let subscriptions = Arc::new(InMemorySubscriptions::new());
    subscriptions.subscribe(OrderPlaced::message_type(), "shipping").await;
    subscriptions.subscribe(OrderPlaced::message_type(), "crm").await;
    let endpoint = EndpointBuilder::new(config(&dir, 0))
        .event::<OrderPlaced>()
        .subscriptions(subscriptions.clone())
        .build()
        .unwrap();

    endpoint.publish(&OrderPlaced { order_id: "o-1".into() }).await.unwrap();
    subscriptions.unsubscribe(&OrderPlaced::message_type(), "crm").await;
    endpoint.publish(&OrderPlaced { order_id: "o-2".into() }).await.unwrap();

    assert_eq!(endpoint.store().counts(&Address::new("shipping")).await.unwrap().ready, 2);
    assert_eq!(endpoint.store().counts(&Address::new("crm")).await.unwrap().ready, 1);

    let err = endpoint.send_local(&OrderPlaced { order_id: "o-3".into() }).await.unwrap_err();
    assert!(matches!(err, PipelineError::Routing(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn workers_drain_the_queue_and_stop_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let handler = PlaceOrderHandler::failing(0);
    let mut config = config(&dir, 0);
    config.concurrency = 2;
    let endpoint = EndpointBuilder::new(config)
        .register::<PlaceOrder, _>(handler.clone())
        .unwrap()
        .command::<PlaceOrder>()
        .command::<BillOrder>()
        .route::<BillOrder>(UnicastRoute::Endpoint("billing".to_string()))
        .build()
        .unwrap();

    let workers = endpoint.start().await.unwrap();
    for i in 0..5 {
        endpoint
            .send_local(&PlaceOrder {
                order_id: format!("o-{i}"),
            })
            .await
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        while handler.handled.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all messages handled");
    workers.shutdown_and_join().await;

    let counts = endpoint.store().counts(&Address::new("sales")).await.unwrap();
    assert_eq!((counts.ready, counts.pending_transactions, counts.committed_transactions), (0, 0, 0));
    assert_eq!(drain(endpoint.store(), "billing").await.len(), 5);
}

#[tokio::test]
async fn start_recovers_leftovers_first() {
    let dir = TempDir::new().unwrap();
    let handler = PlaceOrderHandler::failing(0);
    let endpoint = builder(&dir, 0, handler.clone()).build().unwrap();
    let sales = Address::new("sales");
    endpoint.store().deliver(&sales, &inbound("msg-1", &[])).await.unwrap();
    let abandoned = endpoint.store().claim(&sales).await.unwrap().expect("claimed");
    drop(abandoned);
    assert_eq!(endpoint.store().counts(&sales).await.unwrap().pending_transactions, 1);

    let report = endpoint.recover().await.unwrap();
    assert_eq!(report.pending_rolled_back, 1);
    assert!(endpoint.process_one().await.unwrap());
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
}
