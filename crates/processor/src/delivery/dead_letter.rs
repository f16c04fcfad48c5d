//! Dead-letter routing
//!
//! A record that exhausted its retries is republished unchanged to the
//! dead-letter topic. Why and where it failed travels in headers.

use std::sync::Arc;
use tracing::{error, info};

use crate::error::ProcessorError;
use crate::kafka::{InboundRecord, KafkaResult, RecordSink};

pub const HEADER_REASON: &str = "x-fanin-failure-reason";
pub const HEADER_CLASS: &str = "x-fanin-failure-class";
pub const HEADER_ATTEMPTS: &str = "x-fanin-attempts";
pub const HEADER_SOURCE_TOPIC: &str = "x-fanin-source-topic";
pub const HEADER_SOURCE_PARTITION: &str = "x-fanin-source-partition";
pub const HEADER_SOURCE_OFFSET: &str = "x-fanin-source-offset";
pub const HEADER_CONSUMER: &str = "x-fanin-consumer";

/// What happened to an exhausted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterOutcome {
    Published,
    /// No dead-letter topic is configured
    Dropped,
}

pub struct DeadLetterRouter {
    sink: Arc<dyn RecordSink>,
    topic: Option<String>,
    consumer_name: String,
}

impl DeadLetterRouter {
    pub fn new(sink: Arc<dyn RecordSink>, topic: Option<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.filter(|t| !t.is_empty()),
            consumer_name: consumer_name.into(),
        }
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Headers describing the failure of `record`
    pub fn headers(
        &self,
        record: &InboundRecord,
        failure: &ProcessorError,
        attempts: u32,
    ) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_REASON, failure.to_string()),
            (HEADER_CLASS, failure.kind().as_str().to_string()),
            (HEADER_ATTEMPTS, attempts.to_string()),
            (HEADER_SOURCE_TOPIC, record.topic.clone()),
            (HEADER_SOURCE_PARTITION, record.partition.to_string()),
            (HEADER_SOURCE_OFFSET, record.offset.to_string()),
            (HEADER_CONSUMER, self.consumer_name.clone()),
        ]
    }

    /// Publish the raw payload of `record` to the dead-letter topic
    pub async fn publish(
        &self,
        record: &InboundRecord,
        failure: &ProcessorError,
        attempts: u32,
    ) -> KafkaResult<DeadLetterOutcome> {
        let Some(topic) = self.topic.as_deref() else {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                attempts,
                error = %failure,
                "Retries exhausted and no dead-letter topic configured, dropping record"
            );
            return Ok(DeadLetterOutcome::Dropped);
        };

        let key = record.key.as_deref().map(String::from_utf8_lossy);
        let headers = self.headers(record, failure, attempts);

        self.sink
            .send(topic, key.as_deref(), &record.payload, &headers)
            .await?;

        info!(
            dead_letter_topic = topic,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            attempts,
            class = failure.kind().as_str(),
            "Record dead-lettered"
        );
        Ok(DeadLetterOutcome::Published)
    }
}
