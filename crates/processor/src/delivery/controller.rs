//! Delivery controller
//!
//! One controller owns one consumer and runs the poll cycle on its own
//! task: poll a batch, handle each record in arrival order, then sweep
//! stale joins. A record is either acknowledged (offset committed), left
//! uncommitted while its join waits, or nacked (partition rewound to it).
//! Once a record has failed `retry_ceiling` times in a row it is
//! dead-lettered and acknowledged.

use chrono::{DateTime, Utc};
use fanin_config::WorkerConfig;
use fanin_types::{ConsumerProfile, CorrelationId, Record};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::dead_letter::{DeadLetterOutcome, DeadLetterRouter};
use super::redelivery::{DeliveryKey, RedeliveryTracker};
use super::stats::ControllerStats;
use crate::error::{ProcessorError, Result, TransformError};
use crate::join::{Aggregator, CompletedJoin, FoldOutcome};
use crate::kafka::{InboundRecord, RecordSink, RecordSource};
use crate::transform::Transform;

/// Tuning knobs for one controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_timeout: Duration,
    pub max_poll_records: usize,
    /// Consecutive failures before dead-lettering; 0 behaves like 1
    pub retry_ceiling: u32,
    pub nack_backoff: Duration,
    pub dead_letter_topic: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1000),
            max_poll_records: 500,
            retry_ceiling: 3,
            nack_backoff: Duration::from_millis(1000),
            dead_letter_topic: None,
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            poll_timeout: Duration::from_millis(config.kafka.poll_timeout_ms),
            max_poll_records: config.kafka.max_poll_records,
            retry_ceiling: config.delivery.retry_ceiling,
            nack_backoff: Duration::from_millis(config.delivery.nack_backoff_ms),
            dead_letter_topic: config.delivery.dead_letter_topic.clone(),
        }
    }
}

/// How a record left the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Aggregate forwarded and offset committed
    Forwarded,
    /// Join still waiting for other topics
    Incomplete,
    /// Partition rewound for redelivery
    Nacked,
    /// Published to the dead-letter topic and acknowledged
    DeadLettered,
    /// Retries exhausted with no dead-letter topic, acknowledged
    Dropped,
}

enum Processed {
    Forwarded,
    Incomplete,
}

pub struct DeliveryController<S: RecordSource> {
    worker_id: usize,
    profile: Arc<ConsumerProfile>,
    source: S,
    sink: Arc<dyn RecordSink>,
    aggregator: Aggregator,
    transform: Arc<dyn Transform>,
    dead_letters: DeadLetterRouter,
    redelivery: RedeliveryTracker,
    settings: ControllerSettings,
    stats: ControllerStats,
}

impl<S: RecordSource> DeliveryController<S> {
    pub fn new(
        worker_id: usize,
        profile: Arc<ConsumerProfile>,
        source: S,
        sink: Arc<dyn RecordSink>,
        aggregator: Aggregator,
        transform: Arc<dyn Transform>,
        settings: ControllerSettings,
    ) -> Self {
        let dead_letters = DeadLetterRouter::new(
            sink.clone(),
            settings.dead_letter_topic.clone(),
            profile.consumer_name.clone(),
        );

        Self {
            worker_id,
            profile,
            source,
            sink,
            aggregator,
            transform,
            dead_letters,
            redelivery: RedeliveryTracker::new(),
            settings,
            stats: ControllerStats::default(),
        }
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn redelivery(&self) -> &RedeliveryTracker {
        &self.redelivery
    }

    /// Poll until shutdown is signalled, then leave the group and flush
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> ControllerStats {
        info!(
            worker = self.worker_id,
            consumer = %self.profile.consumer_name,
            topics = ?self.profile.topics_input,
            transform = self.transform.name(),
            "Delivery controller started"
        );

        while !*shutdown.borrow() {
            self.run_once().await;
        }

        info!(worker = self.worker_id, "Shutdown signal received");
        if let Err(e) = self.source.close().await {
            warn!(worker = self.worker_id, error = %e, "Failed to close consumer");
        }
        if let Err(e) = self.sink.flush().await {
            error!(worker = self.worker_id, error = %e, "Failed to flush producer");
        }

        self.stats.log(&self.profile.consumer_name);
        self.stats
    }

    /// One poll cycle: poll, handle the batch, sweep
    ///
    /// Returns the number of records polled.
    pub async fn run_once(&mut self) -> usize {
        let polled = match self
            .source
            .poll(self.settings.poll_timeout, self.settings.max_poll_records)
            .await
        {
            Ok(batch) => {
                let polled = batch.len();
                self.handle_batch(batch).await;
                polled
            }
            Err(e) => {
                warn!(worker = self.worker_id, error = %e, "Poll failed");
                tokio::time::sleep(self.settings.poll_timeout).await;
                0
            }
        };

        self.sweep(Utc::now());
        polled
    }

    /// Handle a polled batch in arrival order
    ///
    /// After a nack the rest of that partition's records in the batch are
    /// skipped; the seek delivers them again.
    pub async fn handle_batch(&mut self, batch: Vec<InboundRecord>) {
        let mut rewound: HashSet<(String, i32)> = HashSet::new();

        for record in batch {
            let partition = (record.topic.clone(), record.partition);
            if rewound.contains(&partition) {
                self.stats.skipped += 1;
                debug!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    "Skipping record behind a rewound offset"
                );
                continue;
            }

            if self.handle(&record, Utc::now()).await == Disposition::Nacked {
                rewound.insert(partition);
            }
        }
    }

    /// Evict stale joins
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let evicted = self.aggregator.sweep(now).len();
        self.stats.evicted += evicted as u64;
        evicted
    }

    /// Drive one record through decode, join, transform and publish
    pub async fn handle(&mut self, record: &InboundRecord, now: DateTime<Utc>) -> Disposition {
        self.stats.received += 1;

        match self.process(record, now).await {
            Ok(Processed::Forwarded) => {
                self.ack(record).await;
                Disposition::Forwarded
            }
            Ok(Processed::Incomplete) => {
                if self.aggregator.acks_incomplete() {
                    self.ack(record).await;
                }
                Disposition::Incomplete
            }
            Err(failure) => self.fail(record, failure).await,
        }
    }

    async fn process(&mut self, record: &InboundRecord, now: DateTime<Utc>) -> Result<Processed> {
        let decoded = Record::from_slice(&record.payload)?;

        match self.aggregator.fold(&record.topic, decoded, now).await? {
            FoldOutcome::Incomplete { id, received, expected } => {
                debug!(
                    correlation_id = %id,
                    topic = %record.topic,
                    received,
                    expected,
                    "Join incomplete"
                );
                self.stats.incomplete += 1;
                Ok(Processed::Incomplete)
            }
            FoldOutcome::Complete(completed) => match self.forward(&completed).await {
                Ok(()) => {
                    self.aggregator.commit(&completed).await?;
                    self.stats.forwarded += 1;
                    Ok(Processed::Forwarded)
                }
                Err(e) => {
                    if let Err(abandon_err) = self.aggregator.abandon(&completed).await {
                        error!(
                            correlation_id = %completed.id,
                            error = %abandon_err,
                            "Failed to keep join state after a failed forward"
                        );
                    }
                    Err(e)
                }
            },
        }
    }

    /// Transform the aggregate and publish it to every output topic
    async fn forward(&self, completed: &CompletedJoin) -> Result<()> {
        let output = self.transform.process(
            completed.aggregate.clone(),
            &self.profile.consumer_name,
            self.profile.metadata.as_deref(),
        )?;

        let payload = output.to_vec().map_err(|e| TransformError::Failed {
            transform: self.transform.name().to_string(),
            reason: e.to_string(),
        })?;

        for topic in &self.profile.topics_output {
            self.sink
                .send(topic, Some(completed.id.as_str()), &payload, &[])
                .await?;
        }

        info!(
            correlation_id = %completed.id,
            topics = ?completed.topics,
            outputs = ?self.profile.topics_output,
            "Join forwarded"
        );
        Ok(())
    }

    async fn fail(&mut self, record: &InboundRecord, failure: ProcessorError) -> Disposition {
        let key = DeliveryKey::of(record);
        let kind = failure.kind();
        self.stats.record_failure(kind);

        let attempts = self.redelivery.record_failure(&key);
        let ceiling = self.settings.retry_ceiling.max(1);

        if attempts < ceiling {
            warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                class = kind.as_str(),
                attempts,
                ceiling,
                error = %failure,
                "Record failed, rewinding"
            );
            return self.nack(record).await;
        }

        let disposition = match self.dead_letters.publish(record, &failure, attempts).await {
            Ok(DeadLetterOutcome::Published) => {
                self.stats.dead_lettered += 1;
                Disposition::DeadLettered
            }
            Ok(DeadLetterOutcome::Dropped) => {
                self.stats.dropped += 1;
                Disposition::Dropped
            }
            Err(e) => {
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Dead-letter publish failed, rewinding"
                );
                return self.nack(record).await;
            }
        };

        if let Some(id) = correlation_id(record) {
            if let Err(e) = self.aggregator.discard(&id).await {
                warn!(correlation_id = %id, error = %e, "Failed to discard join state");
            }
        }

        self.ack(record).await;
        disposition
    }

    /// Commit the record's offset
    async fn ack(&mut self, record: &InboundRecord) {
        match self.source.commit(record).await {
            Ok(()) => self.stats.acked += 1,
            Err(e) => {
                self.stats.commit_failures += 1;
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Offset commit failed"
                );
            }
        }
        self.redelivery.acknowledge(&DeliveryKey::of(record));
    }

    /// Back off, then rewind the partition to the record
    async fn nack(&mut self, record: &InboundRecord) -> Disposition {
        if !self.settings.nack_backoff.is_zero() {
            tokio::time::sleep(self.settings.nack_backoff).await;
        }

        if let Err(e) = self
            .source
            .seek(&record.topic, record.partition, record.offset)
            .await
        {
            self.stats.seek_failures += 1;
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Seek failed"
            );
        }

        self.stats.nacked += 1;
        Disposition::Nacked
    }
}

/// Correlation id of a raw record, when it decodes
fn correlation_id(record: &InboundRecord) -> Option<CorrelationId> {
    Record::from_slice(&record.payload)
        .ok()
        .and_then(|r| r.correlation_id().ok())
}
