//! Process death at each point of a local transaction, followed by a
//! restart that runs the recovery sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shuttle_core::domain::{Address, Headers, OutgoingMessage, headers};
use shuttle_core::impls::NoopEventSink;
use shuttle_core::ports::{SystemClock, UlidGenerator};
use shuttle_core::store::{QueueStore, RecoveryReport, RecoverySweeper};
use tempfile::TempDir;

fn store(dir: &TempDir) -> QueueStore {
    QueueStore::new(dir.path(), Arc::new(UlidGenerator::new(SystemClock)), Arc::new(NoopEventSink))
}

fn message(id: &str, body: &str) -> OutgoingMessage {
    let mut h = Headers::new();
    h.insert(headers::MESSAGE_TYPE.to_string(), "sales.order.place.v1".to_string());
    OutgoingMessage::new(id, h, body.as_bytes().to_vec())
}

#[tokio::test]
async fn crash_before_commit_restores_inbound_and_drops_outgoing() {
    let dir = TempDir::new().unwrap();
    let input = Address::new("input");
    let output = Address::new("output");
    {
        let store = store(&dir);
        store.deliver(&input, &message("msg-1", "inbound")).await.unwrap();
        let mut claimed = store.claim(&input).await.unwrap().expect("claimed");
        claimed.transaction.enlist(&message("msg-out", "out"), &output).await.unwrap();
        // ここでプロセスが死んだことにする
    }

    let restarted = store(&dir);
    let report = RecoverySweeper::new(restarted.clone()).sweep(&input).await.unwrap();
    assert_eq!(report.pending_rolled_back, 1);
    assert_eq!(report.messages_restored, 1);

    assert_eq!(restarted.counts(&input).await.unwrap().ready, 1);
    assert_eq!(restarted.counts(&input).await.unwrap().pending_transactions, 0);
    assert_eq!(restarted.counts(&output).await.unwrap().ready, 0);

    let again = restarted.claim(&input).await.unwrap().expect("claimable again");
    assert_eq!(again.message.message_id(), "msg-1");
    assert_eq!(again.message.body(), b"inbound");
}

#[tokio::test]
async fn crash_after_commit_delivers_everything_and_consumes_inbound() {
    let dir = TempDir::new().unwrap();
    let input = Address::new("input");
    let output = Address::new("output");
    let audit = Address::new("audit");
    {
        let store = store(&dir);
        store.deliver(&input, &message("msg-1", "inbound")).await.unwrap();
        let mut claimed = store.claim(&input).await.unwrap().expect("claimed");
        claimed.transaction.enlist(&message("msg-a", "a"), &output).await.unwrap();
        claimed.transaction.enlist(&message("msg-b", "b"), &audit).await.unwrap();
        claimed.transaction.commit().await.unwrap();
    }

    let restarted = store(&dir);
    let sweeper = RecoverySweeper::new(restarted.clone());
    let report = sweeper.sweep(&input).await.unwrap();
    assert_eq!(report.committed_completed, 1);
    assert_eq!(report.operations_redelivered, 2);
    assert_eq!(report.step_failures, 0);

    let counts = restarted.counts(&input).await.unwrap();
    assert_eq!((counts.ready, counts.pending_transactions, counts.committed_transactions), (0, 0, 0));
    assert!(!restarted.paths(&input).unwrap().body_path("msg-1").exists());

    let a = restarted.claim(&output).await.unwrap().expect("delivered");
    assert_eq!(a.message.message_id(), "msg-a");
    assert_eq!(a.message.body(), b"a");
    let b = restarted.claim(&audit).await.unwrap().expect("delivered");
    assert_eq!(b.message.body(), b"b");

    // 2 回目は何もしない
    assert_eq!(sweeper.sweep(&input).await.unwrap(), RecoveryReport::default());
}

/// The only committed transaction of `queue`.
fn committed_dir(store: &QueueStore, queue: &Address) -> PathBuf {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(store.paths(queue).unwrap().committed)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1);
    dirs.remove(0)
}

/// Do what Complete does for one staged operation, except dropping its
/// record: the process dies right after the message became visible.
async fn deliver_without_dropping_record(
    store: &QueueStore,
    tx_dir: &Path,
    base: &str,
    msg: &OutgoingMessage,
    to: &Address,
) {
    let paths = store.ensure_queue(to).await.unwrap();
    tokio::fs::rename(tx_dir.join(format!("{base}.body.out")), paths.body_path(msg.message_id()))
        .await
        .unwrap();
    let metadata = serde_json::to_vec(msg.headers()).unwrap();
    tokio::fs::write(paths.metadata_path(msg.message_id()), metadata).await.unwrap();
}

#[tokio::test]
async fn crash_midway_through_complete_finishes_the_rest_without_losing_bodies() {
    let dir = TempDir::new().unwrap();
    let input = Address::new("input");
    let output = Address::new("output");
    let audit = Address::new("audit");
    let a = message("msg-a", "a");
    {
        let store = store(&dir);
        store.deliver(&input, &message("msg-1", "inbound")).await.unwrap();
        let mut claimed = store.claim(&input).await.unwrap().expect("claimed");
        claimed.transaction.enlist(&a, &output).await.unwrap();
        claimed.transaction.enlist(&message("msg-b", "b"), &audit).await.unwrap();
        claimed.transaction.commit().await.unwrap();

        // 1 件目だけ配送したところで死ぬ
        let tx_dir = committed_dir(&store, &input);
        deliver_without_dropping_record(&store, &tx_dir, "000000-msg-a", &a, &output).await;
    }

    let restarted = store(&dir);
    let report = RecoverySweeper::new(restarted.clone()).sweep(&input).await.unwrap();
    assert_eq!(report.committed_completed, 1);
    assert_eq!(report.operations_already_delivered, 1);
    assert_eq!(report.operations_redelivered, 1);
    assert_eq!(report.step_failures, 0);

    assert_eq!(restarted.counts(&input).await.unwrap(), Default::default());

    let copies = restarted.ready_messages(&output).await.unwrap();
    assert_eq!(copies.len(), 1);
    let first = restarted.claim(&output).await.unwrap().expect("delivered before the crash");
    assert_eq!(first.message.body(), b"a");
    let second = restarted.claim(&audit).await.unwrap().expect("delivered by the sweep");
    assert_eq!(second.message.body(), b"b");
}

#[tokio::test]
async fn copy_consumed_before_restart_is_not_delivered_again() {
    let dir = TempDir::new().unwrap();
    let input = Address::new("input");
    let output = Address::new("output");
    let out = message("msg-out", "payload");
    {
        let store = store(&dir);
        store.deliver(&input, &message("msg-1", "inbound")).await.unwrap();
        let mut claimed = store.claim(&input).await.unwrap().expect("claimed");
        claimed.transaction.enlist(&out, &output).await.unwrap();
        claimed.transaction.commit().await.unwrap();

        let tx_dir = committed_dir(&store, &input);
        deliver_without_dropping_record(&store, &tx_dir, "000000-msg-out", &out, &output).await;
    }

    // 別プロセスの consumer が先に処理し終えた
    let consumer = store(&dir);
    let mut copy = consumer.claim(&output).await.unwrap().expect("visible");
    assert_eq!(copy.message.body(), b"payload");
    copy.transaction.commit().await.unwrap();
    copy.transaction.complete().await.unwrap();

    let restarted = store(&dir);
    let report = RecoverySweeper::new(restarted.clone()).sweep(&input).await.unwrap();
    assert_eq!(report.committed_completed, 1);
    assert_eq!(report.operations_already_delivered, 1);
    assert_eq!(report.operations_redelivered, 0);

    assert_eq!(restarted.counts(&input).await.unwrap(), Default::default());
    assert!(restarted.claim(&output).await.unwrap().is_none());
}

#[tokio::test]
async fn rollback_leaves_exactly_one_copy() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let input = Address::new("input");
    let output = Address::new("output");
    store.deliver(&input, &message("msg-1", "inbound")).await.unwrap();

    let mut claimed = store.claim(&input).await.unwrap().expect("claimed");
    claimed.transaction.enlist(&message("msg-out", "out"), &output).await.unwrap();
    claimed.transaction.rollback().await.unwrap();

    assert_eq!(store.ready_messages(&input).await.unwrap().len(), 1);
    assert_eq!(store.counts(&input).await.unwrap().pending_transactions, 0);
    assert_eq!(store.counts(&output).await.unwrap().ready, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_consumers_claim_each_message_once() {
    let dir = TempDir::new().unwrap();
    let input = Address::new("input");
    let producer = store(&dir);
    for i in 0..20 {
        producer.deliver(&input, &message(&format!("msg-{i:02}"), "x")).await.unwrap();
    }

    let mut joins = Vec::new();
    for _ in 0..4 {
        let consumer = store(&dir);
        let input = input.clone();
        joins.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(mut claimed) = consumer.claim(&input).await.unwrap() {
                seen.push(claimed.message.message_id().to_string());
                claimed.transaction.commit().await.unwrap();
                claimed.transaction.complete().await.unwrap();
            }
            seen
        }));
    }

    let mut all = Vec::new();
    for join in joins {
        all.extend(join.await.unwrap());
    }
    all.sort();
    let expected: Vec<String> = (0..20).map(|i| format!("msg-{i:02}")).collect();
    assert_eq!(all, expected);
}
