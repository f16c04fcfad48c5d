//! Shared join store
//!
//! Partial joins shared between replicas. Each fold appends a
//! `{"topic", "record"}` entry to the list at `<key_prefix><id>` and
//! refreshes its TTL. Once the list is long enough, one replica takes the
//! whole list with an atomic read-and-delete; the delete is the completion
//! gate, so only the replica that removed the key forwards the aggregate.
//! A list filled by redelivered duplicates is left in place until the
//! missing topic arrives.

use fanin_types::{CorrelationId, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CompletedJoin, FoldOutcome};
use crate::error::{StateError, StateResult};
use crate::state::ListStore;

/// One stored contribution to a join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub topic: String,
    pub record: Record,
}

/// Join state kept in an external [`ListStore`]
pub struct SharedJoinStore {
    store: Arc<dyn ListStore>,
    key_prefix: String,
    expected: BTreeSet<String>,
    ttl: Duration,
}

impl SharedJoinStore {
    pub fn new(
        store: Arc<dyn ListStore>,
        key_prefix: impl Into<String>,
        expected: BTreeSet<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            expected,
            ttl,
        }
    }

    /// Store key for a correlation id
    pub fn key(&self, id: &CorrelationId) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    pub async fn fold(&self, id: CorrelationId, topic: &str, record: Record) -> StateResult<FoldOutcome> {
        let key = self.key(&id);
        let entry = StoredEntry {
            topic: topic.to_string(),
            record,
        };
        let encoded = serde_json::to_vec(&entry).map_err(|e| StateError::SerializationFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        self.store.list_append(&key, &encoded).await?;
        self.store.expire(&key, self.ttl).await?;
        self.try_complete(id, &key).await
    }

    /// Take the list at `key` once it covers every expected topic
    ///
    /// Coverage is checked on a read so duplicates never empty the key. The
    /// take can still race a completion by another replica and return a
    /// newer, partial list; that list is put back and checked again.
    async fn try_complete(&self, id: CorrelationId, key: &str) -> StateResult<FoldOutcome> {
        let expected = self.expected.len();

        loop {
            let length = self.store.list_length(key).await?;
            if length < expected {
                return Ok(FoldOutcome::Incomplete {
                    id,
                    received: length,
                    expected,
                });
            }

            let stored = self.decode(key, &self.store.list_read_all(key).await?)?;
            let covered = topics_of(&stored);
            if !self.expected.is_subset(&covered) {
                debug!(
                    correlation_id = %id,
                    entries = stored.len(),
                    topics = ?covered,
                    "Join list holds duplicates"
                );
                return Ok(FoldOutcome::Incomplete {
                    id,
                    received: covered.intersection(&self.expected).count(),
                    expected,
                });
            }

            let Some(raw) = self.store.take_all(key).await? else {
                debug!(correlation_id = %id, "Join already taken by another replica");
                return Ok(FoldOutcome::Incomplete {
                    id,
                    received: covered.len(),
                    expected,
                });
            };

            let entries = self.decode(key, &raw)?;
            let topics = topics_of(&entries);
            if !self.expected.is_subset(&topics) {
                debug!(correlation_id = %id, topics = ?topics, "Took a partial list, re-queued");
                self.requeue(key, &raw).await?;
                continue;
            }

            let mut aggregate = Record::new();
            for entry in entries {
                aggregate.merge(entry.record);
            }

            return Ok(FoldOutcome::Complete(CompletedJoin {
                id,
                aggregate,
                topics,
                entries: raw,
            }));
        }
    }

    /// Put a taken join back so a redelivery can complete it
    pub async fn abandon(&self, completed: &CompletedJoin) -> StateResult<()> {
        let key = self.key(&completed.id);
        self.requeue(&key, &completed.entries).await
    }

    /// Forget a join
    pub async fn discard(&self, id: &CorrelationId) -> StateResult<bool> {
        self.store.delete(&self.key(id)).await
    }

    fn decode(&self, key: &str, raw: &[Vec<u8>]) -> StateResult<Vec<StoredEntry>> {
        raw.iter()
            .map(|bytes| {
                serde_json::from_slice::<StoredEntry>(bytes).map_err(|e| {
                    StateError::DeserializationFailed {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }

    async fn requeue(&self, key: &str, entries: &[Vec<u8>]) -> StateResult<()> {
        for entry in entries {
            self.store.list_append(key, entry).await?;
        }
        self.store.expire(key, self.ttl).await
    }
}

fn topics_of(entries: &[StoredEntry]) -> BTreeSet<String> {
    entries.iter().map(|e| e.topic.clone()).collect()
}
