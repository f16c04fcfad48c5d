//! In-memory list store
//!
//! DashMap-backed [`ListStore`] with lazy TTL expiry. Used by tests and by
//! single-process deployments that still want the shared join path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::trace;

use super::backend::ListStore;
use crate::error::StateResult;

#[derive(Debug, Clone, Default)]
struct ListEntry {
    values: Vec<Vec<u8>>,
    expires_at: Option<DateTime<Utc>>,
}

impl ListEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// List store held in process memory
#[derive(Debug, Default)]
pub struct MemoryListStore {
    data: DashMap<String, ListEntry>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.data.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key` if its TTL has passed
    fn purge_expired(&self, key: &str) {
        let now = Utc::now();
        if self.data.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            trace!(key, "Expired list removed");
        }
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn list_append(&self, key: &str, value: &[u8]) -> StateResult<usize> {
        self.purge_expired(key);
        let mut entry = self.data.entry(key.to_string()).or_default();
        entry.values.push(value.to_vec());
        Ok(entry.values.len())
    }

    async fn list_length(&self, key: &str) -> StateResult<usize> {
        self.purge_expired(key);
        Ok(self.data.get(key).map_or(0, |e| e.values.len()))
    }

    async fn list_read_all(&self, key: &str) -> StateResult<Vec<Vec<u8>>> {
        self.purge_expired(key);
        Ok(self
            .data
            .get(key)
            .map(|e| e.values.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        self.purge_expired(key);
        Ok(self.data.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StateResult<()> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::max_value());
        if let Entry::Occupied(mut entry) = self.data.entry(key.to_string()) {
            entry.get_mut().expires_at = Utc::now().checked_add_signed(ttl);
        }
        Ok(())
    }

    async fn take_all(&self, key: &str) -> StateResult<Option<Vec<Vec<u8>>>> {
        self.purge_expired(key);
        Ok(self.data.remove(key).map(|(_, entry)| entry.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::backend::tests::*;

    #[tokio::test]
    async fn test_memory_list_ops() {
        let store = MemoryListStore::new();
        test_store_list_ops(&store, "join:1").await;
    }

    #[tokio::test]
    async fn test_memory_take_all() {
        let store = MemoryListStore::new();
        test_store_take_all(&store, "join:2").await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_ttl() {
        let store = MemoryListStore::new();
        store.list_append("join:3", b"v").await.unwrap();
        store.expire("join:3", Duration::from_millis(20)).await.unwrap();
        assert_eq!(store.list_length("join:3").await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.list_length("join:3").await.unwrap(), 0);
        assert_eq!(store.take_all("join:3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_append_after_expiry_starts_fresh() {
        let store = MemoryListStore::new();
        store.list_append("join:4", b"old").await.unwrap();
        store.expire("join:4", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.list_append("join:4", b"new").await.unwrap(), 1);
        assert_eq!(
            store.list_read_all("join:4").await.unwrap(),
            vec![b"new".to_vec()]
        );
    }
}
