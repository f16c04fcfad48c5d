//! Kafka sink for aggregates and dead-lettered records

use async_trait::async_trait;
use fanin_config::KafkaSettings;
use fanin_types::ConsumerProfile;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, info};

use super::error::{KafkaError, Result};
use super::RecordSink;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer shared by every controller in the process
pub struct KafkaRecordSink {
    producer: FutureProducer,
    send_timeout: Duration,
}

impl KafkaRecordSink {
    /// Create the producer and check the brokers are reachable
    pub async fn connect(profile: &ConsumerProfile, settings: &KafkaSettings) -> Result<Self> {
        let brokers = profile.bootstrap_servers_joined();
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| profile.consumer_name.clone());

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("client.id", format!("{}-producer", client_id))
            .set("message.timeout.ms", settings.message_timeout_ms.to_string())
            .set("acks", "all");

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| KafkaError::connection(e.to_string(), &brokers))?;

        producer
            .client()
            .fetch_metadata(None, METADATA_TIMEOUT)
            .map_err(|e| KafkaError::connection(e.to_string(), &brokers))?;

        info!(brokers = %brokers, "Kafka producer created");

        Ok(Self {
            producer,
            send_timeout: Duration::from_millis(settings.message_timeout_ms),
        })
    }
}

#[async_trait]
impl RecordSink for KafkaRecordSink {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: &[(&str, String)],
    ) -> Result<()> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);

        if let Some(key) = key {
            record = record.key(key);
        }

        if !headers.is_empty() {
            let mut owned = OwnedHeaders::new();
            for (k, v) in headers {
                owned = owned.insert(Header {
                    key: k,
                    value: Some(v.as_bytes()),
                });
            }
            record = record.headers(owned);
        }

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok((partition, offset)) => {
                debug!(topic, partition, offset, "Record delivered");
                Ok(())
            }
            Err((err, _)) => Err(KafkaError::production(err.to_string(), topic, None)),
        }
    }

    async fn flush(&self) -> Result<()> {
        info!("Flushing pending messages...");
        self.producer
            .flush(Timeout::After(self.send_timeout))
            .map_err(|e| KafkaError::production(e.to_string(), "*", None))?;
        Ok(())
    }
}
