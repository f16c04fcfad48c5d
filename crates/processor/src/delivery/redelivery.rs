//! Consecutive failure accounting per delivered record

use std::collections::HashMap;

use crate::kafka::InboundRecord;

/// Position of one record in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl DeliveryKey {
    pub fn of(record: &InboundRecord) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        }
    }
}

/// Failure counts keyed by topic, partition and offset
#[derive(Debug, Default)]
pub struct RedeliveryTracker {
    counts: HashMap<DeliveryKey, u32>,
}

impl RedeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failure, returning the total so far
    pub fn record_failure(&mut self, key: &DeliveryKey) -> u32 {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, key: &DeliveryKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Forget `key` and every earlier offset of its partition
    ///
    /// Called once the record is acknowledged; earlier offsets can no
    /// longer be redelivered.
    pub fn acknowledge(&mut self, key: &DeliveryKey) {
        self.counts.retain(|k, _| {
            !(k.topic == key.topic && k.partition == key.partition && k.offset <= key.offset)
        });
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
