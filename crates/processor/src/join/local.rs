//! Local join buffer
//!
//! Partial joins held in process memory. The buffer is owned by a single
//! controller task, so it needs no locking.

use chrono::{DateTime, Utc};
use fanin_types::{CorrelationId, Record};
use std::collections::{BTreeSet, HashMap};

use super::{CompletedJoin, FoldOutcome};

/// Partial aggregate for one correlation id
#[derive(Debug, Clone, PartialEq)]
pub struct JoinState {
    pub aggregate: Record,
    pub topics: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
}

impl JoinState {
    fn new(first_seen: DateTime<Utc>) -> Self {
        Self {
            aggregate: Record::new(),
            topics: BTreeSet::new(),
            first_seen,
        }
    }
}

/// In-process map of partial joins keyed by correlation id
#[derive(Debug, Default)]
pub struct LocalJoinBuffer {
    expected: BTreeSet<String>,
    states: HashMap<CorrelationId, JoinState>,
}

impl LocalJoinBuffer {
    pub fn new(expected: BTreeSet<String>) -> Self {
        Self {
            expected,
            states: HashMap::new(),
        }
    }

    /// Merge `record` into the state for `id`
    ///
    /// A completed state stays in the buffer until [`commit`](Self::commit),
    /// so a redelivered record folds again and completes again.
    pub fn fold(&mut self, id: CorrelationId, topic: &str, record: Record, now: DateTime<Utc>) -> FoldOutcome {
        let state = self
            .states
            .entry(id.clone())
            .or_insert_with(|| JoinState::new(now));

        state.aggregate.merge(record);
        state.topics.insert(topic.to_string());

        if state.topics == self.expected {
            FoldOutcome::Complete(CompletedJoin {
                id,
                aggregate: state.aggregate.clone(),
                topics: state.topics.clone(),
                entries: Vec::new(),
            })
        } else {
            FoldOutcome::Incomplete {
                id,
                received: state.topics.len(),
                expected: self.expected.len(),
            }
        }
    }

    /// Drop the state of a forwarded join
    pub fn commit(&mut self, id: &CorrelationId) -> bool {
        self.states.remove(id).is_some()
    }

    /// Drop the state of a dead-lettered join
    pub fn discard(&mut self, id: &CorrelationId) -> bool {
        self.states.remove(id).is_some()
    }

    pub fn get(&self, id: &CorrelationId) -> Option<&JoinState> {
        self.states.get(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove and return every state for which `expired` holds
    pub(crate) fn drain_where<F>(&mut self, mut expired: F) -> Vec<(CorrelationId, JoinState)>
    where
        F: FnMut(&JoinState) -> bool,
    {
        let ids: Vec<CorrelationId> = self
            .states
            .iter()
            .filter(|(_, state)| expired(state))
            .map(|(id, _)| id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.states.remove(&id).map(|state| (id, state)))
            .collect()
    }
}
