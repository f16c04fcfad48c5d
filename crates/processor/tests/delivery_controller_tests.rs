//! Integration tests for the delivery controller over in-memory transports

mod common;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::{inbound, profile, MemorySink, MemorySource};
use fanin_types::{AggregationMode, Record};
use joiner::delivery::dead_letter::{HEADER_ATTEMPTS, HEADER_CLASS, HEADER_SOURCE_OFFSET, HEADER_SOURCE_TOPIC};
use joiner::transform::{self, METADATA_KEY};
use joiner::{
    Aggregator, ControllerSettings, DeliveryController, Disposition, ListStore, MemoryListStore,
    RecordSink, StateError, StateResult, Transform, TransformError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn settings(retry_ceiling: u32, dead_letter_topic: Option<&str>) -> ControllerSettings {
    ControllerSettings {
        poll_timeout: Duration::from_millis(10),
        max_poll_records: 100,
        retry_ceiling,
        nack_backoff: Duration::ZERO,
        dead_letter_topic: dead_letter_topic.map(str::to_string),
    }
}

fn local_controller(
    inputs: &str,
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
    settings: ControllerSettings,
) -> DeliveryController<Arc<MemorySource>> {
    local_controller_with(inputs, transform::lookup("identity").unwrap(), source, sink, settings)
}

fn local_controller_with(
    inputs: &str,
    transform: Arc<dyn Transform>,
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
    settings: ControllerSettings,
) -> DeliveryController<Arc<MemorySource>> {
    let profile = profile(inputs, AggregationMode::Local, 5);
    let aggregator = Aggregator::local(&profile);
    let sink: Arc<dyn RecordSink> = sink;
    DeliveryController::new(0, Arc::new(profile), source, sink, aggregator, transform, settings)
}

/// Transform that rejects every aggregate
struct RejectingTransform;

impl Transform for RejectingTransform {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn process(&self, _record: Record, _consumer_name: &str, _metadata: Option<&str>) -> Result<Record, TransformError> {
        Err(TransformError::Failed {
            transform: "reject".to_string(),
            reason: "aggregate rejected".to_string(),
        })
    }
}

/// List store whose appends always fail
#[derive(Default)]
struct UnavailableStore {
    inner: MemoryListStore,
}

#[async_trait]
impl ListStore for UnavailableStore {
    async fn list_append(&self, _key: &str, _value: &[u8]) -> StateResult<usize> {
        Err(StateError::StorageError {
            backend_type: "memory".to_string(),
            details: "connection refused".to_string(),
        })
    }

    async fn list_length(&self, key: &str) -> StateResult<usize> {
        self.inner.list_length(key).await
    }

    async fn list_read_all(&self, key: &str) -> StateResult<Vec<Vec<u8>>> {
        self.inner.list_read_all(key).await
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        self.inner.delete(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StateResult<()> {
        self.inner.expire(key, ttl).await
    }

    async fn take_all(&self, key: &str) -> StateResult<Option<Vec<Vec<u8>>>> {
        self.inner.take_all(key).await
    }
}

fn shared_controller(
    worker_id: usize,
    store: Arc<dyn ListStore>,
    source: Arc<MemorySource>,
    sink: Arc<MemorySink>,
) -> DeliveryController<Arc<MemorySource>> {
    let profile = profile("t1,t2", AggregationMode::Shared, 5);
    let aggregator = Aggregator::shared(&profile, store, "test:join:");
    let sink: Arc<dyn RecordSink> = sink;
    DeliveryController::new(
        worker_id,
        Arc::new(profile),
        source,
        sink,
        aggregator,
        transform::lookup("identity").unwrap(),
        settings(3, Some("dlq")),
    )
}

#[tokio::test]
async fn test_two_topic_join_forwards_once() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(3, None));
    let t0 = Utc::now();

    let first = inbound("t1", 0, 0, json!({"id": "x", "content": {"foo": 1}}));
    assert_eq!(controller.handle(&first, t0).await, Disposition::Incomplete);

    let second = inbound("t2", 0, 0, json!({"id": "x", "content": {"bar": 2}}));
    assert_eq!(
        controller.handle(&second, t0 + ChronoDuration::seconds(2)).await,
        Disposition::Forwarded
    );

    let out = sink.sent_to("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key.as_deref(), Some("x"));
    assert_eq!(out[0].json(), json!({"id": "x", "content": {"foo": 1, "bar": 2}}));

    // Local joins commit only the completing record.
    assert_eq!(source.committed("t2", 0), Some(1));
    assert_eq!(source.committed("t1", 0), None);
    assert_eq!(controller.aggregator().pending(), 0);
    assert_eq!(controller.stats().forwarded, 1);
}

#[tokio::test]
async fn test_partial_join_is_evicted_after_timeout() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source, sink.clone(), settings(3, None));
    let t0 = Utc::now();

    let first = inbound("t1", 0, 0, json!({"id": "y", "content": {"foo": 1}}));
    controller.handle(&first, t0).await;

    assert_eq!(controller.sweep(t0 + ChronoDuration::seconds(4)), 0);
    assert_eq!(controller.sweep(t0 + ChronoDuration::milliseconds(5001)), 1);
    assert_eq!(controller.stats().evicted, 1);

    // The late record starts a new join instead of completing the old one.
    let late = inbound("t2", 0, 0, json!({"id": "y", "content": {"bar": 2}}));
    assert_eq!(
        controller.handle(&late, t0 + ChronoDuration::seconds(10)).await,
        Disposition::Incomplete
    );
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_single_topic_completes_with_metadata() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let profile = profile("t1", AggregationMode::Local, 5);
    let aggregator = Aggregator::local(&profile);
    let sink_dyn: Arc<dyn RecordSink> = sink.clone();
    let mut controller = DeliveryController::new(
        0,
        Arc::new(profile),
        source.clone(),
        sink_dyn,
        aggregator,
        transform::lookup("attach-metadata").unwrap(),
        settings(3, None),
    );

    let record = inbound("t1", 2, 7, json!({"id": 42, "content": {"a": 1}}));
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::Forwarded);

    let out = sink.sent_to("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].key.as_deref(), Some("42"));
    assert_eq!(out[0].json()[METADATA_KEY], json!({"lang": "ro"}));
    assert_eq!(source.committed("t1", 2), Some(8));
}

#[tokio::test]
async fn test_poison_record_dead_lettered_once_at_ceiling() {
    let source = Arc::new(MemorySource::new(vec![common::inbound_raw("t1", 0, 0, b"not json")]));
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(3, Some("dlq")));

    for _ in 0..5 {
        controller.run_once().await;
    }

    let dead = sink.sent_to("dlq");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].payload, b"not json".to_vec());
    assert_eq!(dead[0].headers[HEADER_CLASS], "decode");
    assert_eq!(dead[0].headers[HEADER_ATTEMPTS], "3");
    assert_eq!(dead[0].headers[HEADER_SOURCE_TOPIC], "t1");
    assert_eq!(dead[0].headers[HEADER_SOURCE_OFFSET], "0");

    assert_eq!(source.seeks().len(), 2);
    assert_eq!(source.committed("t1", 0), Some(1));
    assert_eq!(controller.stats().nacked, 2);
    assert_eq!(controller.stats().dead_lettered, 1);
    assert!(controller.redelivery().is_empty());
}

#[tokio::test]
async fn test_ceiling_zero_dead_letters_first_failure() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(0, Some("dlq")));

    let record = inbound("t9", 0, 3, json!({"id": "x"}));
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::DeadLettered);
    assert_eq!(sink.sent_to("dlq")[0].headers[HEADER_CLASS], "decode");
    assert!(source.seeks().is_empty());
}

#[tokio::test]
async fn test_nack_skips_rest_of_partition_in_batch() {
    let source = Arc::new(MemorySource::new(vec![
        common::inbound_raw("t1", 0, 0, b"{broken"),
        inbound("t1", 0, 1, json!({"id": "a", "content": {"foo": 1}})),
        inbound("t2", 0, 0, json!({"id": "a", "content": {"bar": 2}})),
    ]));
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(3, Some("dlq")));

    controller.run_once().await;
    assert_eq!(controller.stats().skipped, 1);
    assert_eq!(controller.stats().incomplete, 1);
    assert!(sink.sent_to("out").is_empty());

    controller.run_once().await;
    controller.run_once().await;

    // Third failure dead-letters the broken record; the record behind it completes the join.
    assert_eq!(sink.sent_to("dlq").len(), 1);
    let out = sink.sent_to("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].json(), json!({"id": "a", "content": {"foo": 1, "bar": 2}}));
    assert_eq!(source.committed("t1", 0), Some(2));
}

#[tokio::test]
async fn test_failed_publish_keeps_join_for_redelivery() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(3, Some("dlq")));
    let now = Utc::now();

    controller
        .handle(&inbound("t1", 0, 0, json!({"id": "x", "content": {"foo": 1}})), now)
        .await;

    sink.fail_topic("out");
    let second = inbound("t2", 0, 4, json!({"id": "x", "content": {"bar": 2}}));
    assert_eq!(controller.handle(&second, now).await, Disposition::Nacked);
    assert_eq!(source.seeks(), vec![("t2".to_string(), 0, 4)]);
    assert_eq!(source.committed("t2", 0), None);
    assert_eq!(controller.stats().publish_failures, 1);

    sink.heal("out");
    assert_eq!(controller.handle(&second, now).await, Disposition::Forwarded);
    assert_eq!(sink.sent_to("out").len(), 1);
    assert_eq!(source.committed("t2", 0), Some(5));
}

#[tokio::test]
async fn test_exhausted_publish_discards_join() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(2, Some("dlq")));
    let now = Utc::now();

    controller.handle(&inbound("t1", 0, 0, json!({"id": "x"})), now).await;
    sink.fail_topic("out");

    let second = inbound("t2", 0, 0, json!({"id": "x"}));
    assert_eq!(controller.handle(&second, now).await, Disposition::Nacked);
    assert_eq!(controller.handle(&second, now).await, Disposition::DeadLettered);

    let dead = sink.sent_to("dlq");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].headers[HEADER_CLASS], "publish");
    assert_eq!(controller.aggregator().pending(), 0);
}

#[tokio::test]
async fn test_failed_dead_letter_publish_nacks() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(1, Some("dlq")));
    let record = common::inbound_raw("t1", 0, 9, b"[]");

    sink.fail_topic("dlq");
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::Nacked);
    assert_eq!(source.committed("t1", 0), None);

    sink.heal("dlq");
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::DeadLettered);
    assert_eq!(sink.sent_to("dlq")[0].headers[HEADER_ATTEMPTS], "2");
    assert_eq!(source.committed("t1", 0), Some(10));
}

#[tokio::test]
async fn test_exhausted_without_dead_letter_topic_is_dropped() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(1, None));

    let record = inbound("t1", 0, 0, json!({"content": {"no": "id"}}));
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::Dropped);
    assert!(sink.sent().is_empty());
    assert_eq!(source.committed("t1", 0), Some(1));
    assert_eq!(controller.stats().dropped, 1);
}

#[tokio::test]
async fn test_transform_failure_dead_letters_at_ceiling() {
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = local_controller_with(
        "t1",
        Arc::new(RejectingTransform),
        source.clone(),
        sink.clone(),
        settings(3, Some("dlq")),
    );
    let record = inbound("t1", 0, 5, json!({"id": "x", "content": {"a": 1}}));
    let now = Utc::now();

    assert_eq!(controller.handle(&record, now).await, Disposition::Nacked);
    assert_eq!(controller.handle(&record, now).await, Disposition::Nacked);
    assert_eq!(controller.handle(&record, now).await, Disposition::DeadLettered);

    let dead = sink.sent_to("dlq");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].headers[HEADER_CLASS], "transform");
    assert_eq!(dead[0].headers[HEADER_ATTEMPTS], "3");
    assert!(sink.sent_to("out").is_empty());

    assert_eq!(source.seeks().len(), 2);
    assert_eq!(source.committed("t1", 0), Some(6));
    assert_eq!(controller.aggregator().pending(), 0);
}

#[tokio::test]
async fn test_join_store_failure_nacks_without_commit() {
    let store: Arc<dyn ListStore> = Arc::new(UnavailableStore::default());
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = shared_controller(0, store, source.clone(), sink.clone());

    let record = inbound("t1", 1, 3, json!({"id": "x"}));
    assert_eq!(controller.handle(&record, Utc::now()).await, Disposition::Nacked);

    assert_eq!(source.seeks(), vec![("t1".to_string(), 1, 3)]);
    assert_eq!(source.committed("t1", 1), None);
    assert_eq!(controller.stats().nacked, 1);
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_shared_failed_publish_requeues_join() {
    let memory = Arc::new(MemoryListStore::new());
    let store: Arc<dyn ListStore> = memory.clone();
    let source = Arc::new(MemorySource::default());
    let sink = Arc::new(MemorySink::new());
    let mut controller = shared_controller(0, store, source.clone(), sink.clone());
    let now = Utc::now();

    let first = inbound("t1", 0, 0, json!({"id": "x", "content": {"foo": 1}}));
    assert_eq!(controller.handle(&first, now).await, Disposition::Incomplete);
    assert_eq!(source.committed("t1", 0), Some(1));

    sink.fail_topic("out");
    let second = inbound("t2", 0, 0, json!({"id": "x", "content": {"bar": 2}}));
    assert_eq!(controller.handle(&second, now).await, Disposition::Nacked);
    assert_eq!(memory.list_length("test:join:x").await.unwrap(), 2);
    assert_eq!(source.committed("t2", 0), None);

    sink.heal("out");
    assert_eq!(controller.handle(&second, now).await, Disposition::Forwarded);

    let out = sink.sent_to("out");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].json(), json!({"id": "x", "content": {"foo": 1, "bar": 2}}));
    assert!(memory.is_empty());
    assert_eq!(source.committed("t2", 0), Some(1));
}

#[tokio::test]
async fn test_shared_replicas_forward_at_most_once() {
    let store: Arc<dyn ListStore> = Arc::new(MemoryListStore::new());
    let sink = Arc::new(MemorySink::new());
    let source_a = Arc::new(MemorySource::default());
    let source_b = Arc::new(MemorySource::default());
    let mut replica_a = shared_controller(0, store.clone(), source_a.clone(), sink.clone());
    let mut replica_b = shared_controller(1, store.clone(), source_b.clone(), sink.clone());
    let now = Utc::now();

    for i in 0..50 {
        let id = format!("id-{}", i);
        let on_t1 = inbound("t1", 0, i, json!({"id": id, "content": {"foo": i}}));
        let on_t2 = inbound("t2", 0, i, json!({"id": id, "content": {"bar": i}}));
        tokio::join!(replica_a.handle(&on_t1, now), replica_b.handle(&on_t2, now));
    }

    let out = sink.sent_to("out");
    assert_eq!(out.len(), 50);
    let mut keys: Vec<String> = out.iter().filter_map(|r| r.key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 50);

    // Shared joins commit incomplete records too.
    assert_eq!(source_a.committed("t1", 0), Some(50));
    assert_eq!(source_b.committed("t2", 0), Some(50));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let source = Arc::new(MemorySource::new(vec![
        inbound("t1", 0, 0, json!({"id": "x", "content": {"foo": 1}})),
        inbound("t2", 0, 0, json!({"id": "x", "content": {"bar": 2}})),
    ]));
    let sink = Arc::new(MemorySink::new());
    let controller = local_controller("t1,t2", source.clone(), sink.clone(), settings(3, None));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(controller.run(rx));

    let forwarded = common::wait_for_condition(
        || !sink.sent_to("out").is_empty(),
        Duration::from_secs(5),
        Duration::from_millis(5),
    )
    .await;
    assert!(forwarded);

    tx.send(true).unwrap();
    let stats = handle.await.unwrap();

    assert_eq!(stats.received, 2);
    assert_eq!(stats.forwarded, 1);
    assert!(source.is_closed());
    assert!(sink.was_flushed());
}
