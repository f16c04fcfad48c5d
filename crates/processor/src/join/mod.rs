//! Fan-in join
//!
//! [`Aggregator`] folds decoded records into partial joins and reports when
//! every expected topic has contributed. Completion is two-phase: the
//! controller calls [`Aggregator::commit`] after a successful forward,
//! [`Aggregator::abandon`] after a failed one and [`Aggregator::discard`]
//! after dead-lettering.

pub mod local;
pub mod shared;
pub mod sweeper;

use chrono::{DateTime, Utc};
use fanin_types::{AggregationMode, ConsumerProfile, CorrelationId, Record};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{ProcessorError, Result};
use crate::state::ListStore;

pub use local::{JoinState, LocalJoinBuffer};
pub use shared::{SharedJoinStore, StoredEntry};
pub use sweeper::{EvictedJoin, EvictionSweeper};

/// A join that received every expected topic
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJoin {
    pub id: CorrelationId,
    pub aggregate: Record,
    pub topics: BTreeSet<String>,
    /// Raw store entries taken from the shared store, empty for local joins
    pub(crate) entries: Vec<Vec<u8>>,
}

/// Result of folding one record
#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    Incomplete {
        id: CorrelationId,
        received: usize,
        expected: usize,
    },
    Complete(CompletedJoin),
}

enum Topology {
    Local {
        buffer: LocalJoinBuffer,
        sweeper: EvictionSweeper,
    },
    Shared(SharedJoinStore),
}

/// Join front end over the local buffer or the shared store
pub struct Aggregator {
    expected: BTreeSet<String>,
    topology: Topology,
}

impl Aggregator {
    /// Local buffer with sweeper eviction
    pub fn local(profile: &ConsumerProfile) -> Self {
        let expected = profile.expected_topics();
        Self {
            topology: Topology::Local {
                buffer: LocalJoinBuffer::new(expected.clone()),
                sweeper: EvictionSweeper::new(profile.join_timeout),
            },
            expected,
        }
    }

    /// Shared store with TTL expiry
    pub fn shared(profile: &ConsumerProfile, store: Arc<dyn ListStore>, key_prefix: &str) -> Self {
        let expected = profile.expected_topics();
        Self {
            topology: Topology::Shared(SharedJoinStore::new(
                store,
                key_prefix,
                expected.clone(),
                profile.join_timeout,
            )),
            expected,
        }
    }

    /// Pick the topology named by the profile
    pub fn for_profile(
        profile: &ConsumerProfile,
        store: Option<Arc<dyn ListStore>>,
        key_prefix: &str,
    ) -> Result<Self> {
        match (profile.mode, store) {
            (AggregationMode::Local, _) => Ok(Self::local(profile)),
            (AggregationMode::Shared, Some(store)) => Ok(Self::shared(profile, store, key_prefix)),
            (AggregationMode::Shared, None) => Err(ProcessorError::Configuration(
                "shared aggregation requires a join store".to_string(),
            )),
        }
    }

    /// Fold `record`, received on `topic`, into its join
    pub async fn fold(&mut self, topic: &str, record: Record, now: DateTime<Utc>) -> Result<FoldOutcome> {
        if !self.expected.contains(topic) {
            return Err(ProcessorError::UnexpectedTopic {
                topic: topic.to_string(),
                expected: self.expected.iter().cloned().collect(),
            });
        }

        let id = record.correlation_id()?;
        match &mut self.topology {
            Topology::Local { buffer, .. } => Ok(buffer.fold(id, topic, record, now)),
            Topology::Shared(store) => Ok(store.fold(id, topic, record).await?),
        }
    }

    /// Release the state of a forwarded join
    pub async fn commit(&mut self, completed: &CompletedJoin) -> Result<()> {
        if let Topology::Local { buffer, .. } = &mut self.topology {
            buffer.commit(&completed.id);
        }
        Ok(())
    }

    /// Keep a join whose forward failed so a redelivery can complete it
    pub async fn abandon(&mut self, completed: &CompletedJoin) -> Result<()> {
        match &mut self.topology {
            Topology::Local { .. } => Ok(()),
            Topology::Shared(store) => Ok(store.abandon(completed).await?),
        }
    }

    /// Drop whatever state exists for `id`
    pub async fn discard(&mut self, id: &CorrelationId) -> Result<()> {
        match &mut self.topology {
            Topology::Local { buffer, .. } => {
                buffer.discard(id);
                Ok(())
            }
            Topology::Shared(store) => {
                store.discard(id).await?;
                Ok(())
            }
        }
    }

    /// Evict stale local joins, a no-op for the shared topology
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<EvictedJoin> {
        match &mut self.topology {
            Topology::Local { buffer, sweeper } => sweeper.sweep(buffer, now),
            Topology::Shared(_) => Vec::new(),
        }
    }

    /// Whether incomplete records are committed right away
    pub fn acks_incomplete(&self) -> bool {
        matches!(self.topology, Topology::Shared(_))
    }

    /// Partial joins held in memory
    pub fn pending(&self) -> usize {
        match &self.topology {
            Topology::Local { buffer, .. } => buffer.len(),
            Topology::Shared(_) => 0,
        }
    }

    pub fn expected_topics(&self) -> &BTreeSet<String> {
        &self.expected
    }
}
