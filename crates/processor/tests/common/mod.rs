//! Common test utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fanin_types::{AggregationMode, ConsumerProfile, RawConsumerProfile};
use joiner::{InboundRecord, KafkaError, KafkaResult, RecordSink, RecordSource};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use testcontainers::{clients::Cli, Container, RunnableImage};
use testcontainers_modules::{kafka::Kafka, redis::Redis};

/// Build a profile joining `inputs` into `out`
pub fn profile(inputs: &str, mode: AggregationMode, timeout_seconds: u64) -> ConsumerProfile {
    profile_on("localhost:9092", inputs, "out", mode, timeout_seconds)
}

/// Build a profile against a specific broker list
pub fn profile_on(
    bootstrap_servers: &str,
    inputs: &str,
    outputs: &str,
    mode: AggregationMode,
    timeout_seconds: u64,
) -> ConsumerProfile {
    ConsumerProfile::try_from(RawConsumerProfile {
        consumer_name: "test-worker".to_string(),
        topics_input: inputs.to_string(),
        topics_output: outputs.to_string(),
        bootstrap_servers: bootstrap_servers.to_string(),
        timeout_seconds: Some(timeout_seconds),
        metadata: Some(r#"{"lang":"ro"}"#.to_string()),
        mode: Some(mode),
        group_id: None,
    })
    .expect("valid test profile")
}

/// Encode a JSON value as an inbound record
pub fn inbound(topic: &str, partition: i32, offset: i64, value: Value) -> InboundRecord {
    InboundRecord::new(topic, partition, offset, serde_json::to_vec(&value).unwrap())
}

#[derive(Default)]
struct SourceState {
    log: Vec<InboundRecord>,
    positions: HashMap<(String, i32), i64>,
    committed: HashMap<(String, i32), i64>,
    seeks: Vec<(String, i32, i64)>,
    closed: bool,
}

/// In-memory consumer over a fixed log
///
/// Records are delivered in log order from each partition's position.
/// `seek` moves the position back so records are delivered again.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<SourceState>,
}

impl MemorySource {
    pub fn new(log: Vec<InboundRecord>) -> Self {
        Self {
            state: Mutex::new(SourceState {
                log,
                ..Default::default()
            }),
        }
    }

    pub fn push(&self, record: InboundRecord) {
        self.state.lock().unwrap().log.push(record);
    }

    /// Next offset to consume as committed, per partition
    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    pub fn seeks(&self) -> Vec<(String, i32, i64)> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn poll(&self, timeout: Duration, max_records: usize) -> KafkaResult<Vec<InboundRecord>> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            let mut batch = Vec::new();
            let mut delivered: HashSet<(String, i32, i64)> = HashSet::new();

            for record in state.log.clone() {
                if batch.len() >= max_records {
                    break;
                }
                let tp = (record.topic.clone(), record.partition);
                let position = state.positions.get(&tp).copied().unwrap_or(0);
                if record.offset >= position
                    && delivered.insert((record.topic.clone(), record.partition, record.offset))
                {
                    state.positions.insert(tp, record.offset + 1);
                    batch.push(record);
                }
            }
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(timeout.min(Duration::from_millis(5))).await;
        }
        Ok(batch)
    }

    async fn commit(&self, record: &InboundRecord) -> KafkaResult<()> {
        self.state
            .lock()
            .unwrap()
            .committed
            .insert((record.topic.clone(), record.partition), record.offset + 1);
        Ok(())
    }

    async fn seek(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        let mut state = self.state.lock().unwrap();
        state.positions.insert((topic.to_string(), partition), offset);
        state.seeks.push((topic.to_string(), partition, offset));
        Ok(())
    }

    async fn close(&self) -> KafkaResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// A record captured by [`MemorySink`]
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl SentRecord {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// In-memory producer that can be told to fail
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentRecord>>,
    failing_topics: Mutex<HashSet<String>>,
    flushed: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `topic` fail until [`heal`](Self::heal)
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub fn heal(&self, topic: &str) {
        self.failing_topics.lock().unwrap().remove(topic);
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<SentRecord> {
        self.sent()
            .into_iter()
            .filter(|r| r.topic == topic)
            .collect()
    }

    pub fn was_flushed(&self) -> bool {
        *self.flushed.lock().unwrap()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: &[(&str, String)],
    ) -> KafkaResult<()> {
        if self.failing_topics.lock().unwrap().contains(topic) {
            return Err(KafkaError::production("broker unavailable", topic, None));
        }

        self.sent.lock().unwrap().push(SentRecord {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        Ok(())
    }

    async fn flush(&self) -> KafkaResult<()> {
        *self.flushed.lock().unwrap() = true;
        Ok(())
    }
}

/// Inbound record with an arbitrary payload
pub fn inbound_raw(topic: &str, partition: i32, offset: i64, payload: &[u8]) -> InboundRecord {
    InboundRecord::new(topic, partition, offset, payload.to_vec())
}

/// Test container wrapper for Kafka
pub struct KafkaTestContainer<'a> {
    pub container: Container<'a, Kafka>,
    pub bootstrap_servers: String,
}

impl<'a> KafkaTestContainer<'a> {
    pub fn start(docker: &'a Cli) -> Self {
        let container = docker.run(RunnableImage::from(Kafka::default()));
        let bootstrap_servers = format!("localhost:{}", container.get_host_port_ipv4(9093));

        // Wait for the broker to accept clients
        std::thread::sleep(Duration::from_secs(5));

        Self {
            container,
            bootstrap_servers,
        }
    }
}

/// Test container wrapper for Redis
pub struct RedisTestContainer<'a> {
    pub container: Container<'a, Redis>,
    pub url: String,
}

impl<'a> RedisTestContainer<'a> {
    pub fn start(docker: &'a Cli) -> Self {
        let container = docker.run(RunnableImage::from(Redis::default()));
        let url = format!("redis://localhost:{}", container.get_host_port_ipv4(6379));
        Self { container, url }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for_condition<F>(mut check: F, timeout: Duration, check_interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        tokio::time::sleep(check_interval).await;
    }
    false
}
