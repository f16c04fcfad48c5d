//! Kafka source consumer
//!
//! Wraps an rdkafka [`StreamConsumer`] subscribed to the profile's input
//! topics. Offsets are committed synchronously, one record at a time, and
//! a failed record is redelivered by seeking its partition back.

use async_trait::async_trait;
use chrono::DateTime;
use fanin_config::KafkaSettings;
use fanin_types::ConsumerProfile;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaResult as RdKafkaResult;
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientContext, Message, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, error, info};

use super::error::{KafkaError, Result};
use super::{InboundRecord, RecordSource};

/// Upper bound for metadata, seek and other blocking broker calls
const BROKER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumer context logging rebalances and commit failures
pub struct JoinConsumerContext {
    consumer_name: String,
}

impl ClientContext for JoinConsumerContext {}

impl ConsumerContext for JoinConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                info!(consumer = %self.consumer_name, "Partition revocation: {:?}", tpl);
            }
            Rebalance::Assign(tpl) => {
                info!(consumer = %self.consumer_name, "Partition assignment: {:?}", tpl);
            }
            Rebalance::Error(err) => {
                error!(consumer = %self.consumer_name, "Rebalance error: {}", err);
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance) {
        if let Rebalance::Assign(tpl) = rebalance {
            let partitions: Vec<(String, i32)> = tpl
                .elements()
                .iter()
                .map(|elem| (elem.topic().to_string(), elem.partition()))
                .collect();
            info!(consumer = %self.consumer_name, "Assigned partitions: {:?}", partitions);
        }
    }

    fn commit_callback(&self, result: RdKafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(err) = result {
            error!(consumer = %self.consumer_name, "Commit callback error: {}", err);
        }
    }
}

/// Kafka consumer for the profile's input topics
pub struct KafkaRecordSource {
    consumer: StreamConsumer<JoinConsumerContext>,
    brokers: String,
}

impl KafkaRecordSource {
    /// Create the consumer, check the brokers are reachable and subscribe
    pub async fn connect(profile: &ConsumerProfile, settings: &KafkaSettings) -> Result<Self> {
        let brokers = profile.bootstrap_servers_joined();
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| profile.consumer_name.clone());

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("group.id", &profile.group_id)
            .set("client.id", format!("{}-consumer", client_id))
            .set("enable.auto.commit", settings.enable_auto_commit.to_string())
            .set("auto.offset.reset", &settings.auto_offset_reset);

        for (key, value) in &settings.extra_config {
            client_config.set(key, value);
        }

        let context = JoinConsumerContext {
            consumer_name: profile.consumer_name.clone(),
        };

        let consumer: StreamConsumer<JoinConsumerContext> = client_config
            .create_with_context(context)
            .map_err(|e| KafkaError::connection(e.to_string(), &brokers))?;

        consumer
            .fetch_metadata(None, BROKER_CALL_TIMEOUT)
            .map_err(|e| KafkaError::connection(e.to_string(), &brokers))?;

        let topics: Vec<&str> = profile.topics_input.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| KafkaError::invalid_config(e.to_string(), Some("topics_input".into())))?;

        info!(
            consumer = %profile.consumer_name,
            group = %profile.group_id,
            "Subscribed to topics: {:?}", topics
        );

        Ok(Self { consumer, brokers })
    }

    fn to_inbound(msg: &BorrowedMessage<'_>) -> InboundRecord {
        let timestamp = msg
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis);

        InboundRecord {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(|k| k.to_vec()),
            payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
            timestamp,
        }
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn poll(&self, timeout: Duration, max_records: usize) -> Result<Vec<InboundRecord>> {
        let mut batch = Vec::new();

        // Block for the first record, then drain whatever is already buffered.
        let mut wait = timeout;
        while batch.len() < max_records {
            match tokio::time::timeout(wait, self.consumer.recv()).await {
                Ok(Ok(msg)) => batch.push(Self::to_inbound(&msg)),
                Ok(Err(rdkafka::error::KafkaError::PartitionEOF(partition))) => {
                    debug!("Reached end of partition {}", partition);
                }
                Ok(Err(e)) => {
                    if batch.is_empty() {
                        return Err(KafkaError::consumption(e.to_string(), "*", None, None));
                    }
                    error!(error = %e, "Error polling message, returning partial batch");
                    break;
                }
                Err(_) => break,
            }
            wait = Duration::ZERO;
        }

        Ok(batch)
    }

    async fn commit(&self, record: &InboundRecord) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| {
                KafkaError::offset_commit(e.to_string(), &record.topic, record.partition, record.offset)
            })?;

        self.consumer.commit(&tpl, CommitMode::Sync).map_err(|e| {
            KafkaError::offset_commit(e.to_string(), &record.topic, record.partition, record.offset)
        })?;

        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Committed offset"
        );
        Ok(())
    }

    async fn seek(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        self.consumer
            .seek(topic, partition, Offset::Offset(offset), BROKER_CALL_TIMEOUT)
            .map_err(|e| KafkaError::seek(e.to_string(), topic, partition, offset))?;

        info!("Seeked to offset {} for {}/{}", offset, topic, partition);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!(brokers = %self.brokers, "Stopping Kafka source consumer");
        self.consumer.unsubscribe();
        Ok(())
    }
}
