//! Broker transport
//!
//! The delivery controller talks to the broker through two traits:
//! [`RecordSource`] (consumer-group polling, manual commit, per-partition
//! seek) and [`RecordSink`] (per-record acknowledged publish). The rdkafka
//! implementations live in [`source`] and [`sink`]; tests substitute
//! in-memory versions.

pub mod error;
pub mod sink;
pub mod source;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use error::{KafkaError, Result as KafkaResult};
pub use sink::KafkaRecordSink;
pub use source::KafkaRecordSource;

/// A record as delivered by the broker, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundRecord {
    /// Build a record with no key or timestamp
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: payload.into(),
            timestamp: None,
        }
    }
}

/// Consumer side of the broker
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait up to `timeout` for records and return at most `max_records`
    ///
    /// An empty batch is a normal outcome.
    async fn poll(&self, timeout: Duration, max_records: usize) -> KafkaResult<Vec<InboundRecord>>;

    /// Commit the position just past `record`
    async fn commit(&self, record: &InboundRecord) -> KafkaResult<()>;

    /// Rewind a partition so `offset` is delivered again
    async fn seek(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()>;

    /// Leave the consumer group
    async fn close(&self) -> KafkaResult<()>;
}

/// Producer side of the broker
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Publish one record and wait for the broker acknowledgement
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: &[(&str, String)],
    ) -> KafkaResult<()>;

    /// Wait for in-flight records
    async fn flush(&self) -> KafkaResult<()>;
}

#[async_trait]
impl<T: RecordSource + ?Sized> RecordSource for std::sync::Arc<T> {
    async fn poll(&self, timeout: Duration, max_records: usize) -> KafkaResult<Vec<InboundRecord>> {
        (**self).poll(timeout, max_records).await
    }

    async fn commit(&self, record: &InboundRecord) -> KafkaResult<()> {
        (**self).commit(record).await
    }

    async fn seek(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        (**self).seek(topic, partition, offset).await
    }

    async fn close(&self) -> KafkaResult<()> {
        (**self).close().await
    }
}
