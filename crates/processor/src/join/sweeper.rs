//! Eviction of stale partial joins
//!
//! Runs once per poll cycle over the local buffer. A join whose first
//! record is older than the profile timeout is dropped without being
//! forwarded or dead-lettered. The shared topology relies on the store's
//! key TTL instead.

use chrono::{DateTime, Utc};
use fanin_types::CorrelationId;
use std::time::Duration;
use tracing::warn;

use super::local::LocalJoinBuffer;

/// A join dropped by the sweeper
#[derive(Debug, Clone, PartialEq)]
pub struct EvictedJoin {
    pub id: CorrelationId,
    pub topics: Vec<String>,
    pub age: Duration,
}

#[derive(Debug, Clone)]
pub struct EvictionSweeper {
    timeout: Duration,
}

impl EvictionSweeper {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop every join with `now - first_seen > timeout`
    pub fn sweep(&self, buffer: &mut LocalJoinBuffer, now: DateTime<Utc>) -> Vec<EvictedJoin> {
        let timeout = self.timeout;
        let evicted = buffer.drain_where(|state| age(now, state.first_seen) > timeout);

        evicted
            .into_iter()
            .map(|(id, state)| {
                let age = age(now, state.first_seen);
                let topics: Vec<String> = state.topics.into_iter().collect();
                warn!(
                    correlation_id = %id,
                    topics = ?topics,
                    age_ms = age.as_millis() as u64,
                    "Evicting incomplete join after timeout"
                );
                EvictedJoin { id, topics, age }
            })
            .collect()
    }
}

fn age(now: DateTime<Utc>, first_seen: DateTime<Utc>) -> Duration {
    now.signed_duration_since(first_seen)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
