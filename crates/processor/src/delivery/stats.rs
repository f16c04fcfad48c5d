//! Controller counters

use tracing::info;

use crate::error::FailureKind;

/// Counters kept by one delivery controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Records handed over by the source
    pub received: u64,
    /// Aggregates published to every output topic
    pub forwarded: u64,
    /// Records folded into a join that is still waiting
    pub incomplete: u64,
    /// Offsets committed
    pub acked: u64,
    /// Partitions rewound after a failure
    pub nacked: u64,
    /// Records later in a batch than a nacked record of the same partition
    pub skipped: u64,
    /// Records published to the dead-letter topic
    pub dead_lettered: u64,
    /// Exhausted records dropped because no dead-letter topic is configured
    pub dropped: u64,
    /// Partial joins evicted after the join timeout
    pub evicted: u64,
    pub decode_failures: u64,
    pub store_failures: u64,
    pub transform_failures: u64,
    pub publish_failures: u64,
    pub transport_failures: u64,
    pub commit_failures: u64,
    pub seek_failures: u64,
}

impl ControllerStats {
    pub fn record_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Decode => self.decode_failures += 1,
            FailureKind::JoinStore => self.store_failures += 1,
            FailureKind::Transform => self.transform_failures += 1,
            FailureKind::Publish => self.publish_failures += 1,
            FailureKind::Transport => self.transport_failures += 1,
        }
    }

    /// Add another controller's counters to these
    pub fn merge(&mut self, other: &ControllerStats) {
        self.received += other.received;
        self.forwarded += other.forwarded;
        self.incomplete += other.incomplete;
        self.acked += other.acked;
        self.nacked += other.nacked;
        self.skipped += other.skipped;
        self.dead_lettered += other.dead_lettered;
        self.dropped += other.dropped;
        self.evicted += other.evicted;
        self.decode_failures += other.decode_failures;
        self.store_failures += other.store_failures;
        self.transform_failures += other.transform_failures;
        self.publish_failures += other.publish_failures;
        self.transport_failures += other.transport_failures;
        self.commit_failures += other.commit_failures;
        self.seek_failures += other.seek_failures;
    }

    /// Total per-record failures of any kind
    pub fn failures(&self) -> u64 {
        self.decode_failures
            + self.store_failures
            + self.transform_failures
            + self.publish_failures
            + self.transport_failures
    }

    pub fn log(&self, consumer_name: &str) {
        info!(
            consumer = consumer_name,
            received = self.received,
            forwarded = self.forwarded,
            incomplete = self.incomplete,
            acked = self.acked,
            nacked = self.nacked,
            skipped = self.skipped,
            dead_lettered = self.dead_lettered,
            dropped = self.dropped,
            evicted = self.evicted,
            decode_failures = self.decode_failures,
            store_failures = self.store_failures,
            transform_failures = self.transform_failures,
            publish_failures = self.publish_failures,
            commit_failures = self.commit_failures,
            seek_failures = self.seek_failures,
            "Controller statistics"
        );
    }
}
