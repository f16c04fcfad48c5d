//! List store trait definition
//!
//! The shared join topology keeps each partial join as a list of entries
//! under one key. [`ListStore`] is the small set of list and TTL operations
//! it needs from the store.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StateResult;

/// Key-value store with list values and per-key expiry
///
/// Implementations must be safe to share between controller tasks.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append `value` to the list at `key`, creating it if needed
    ///
    /// Returns the list length after the append.
    async fn list_append(&self, key: &str, value: &[u8]) -> StateResult<usize>;

    /// Length of the list at `key`, zero when absent
    async fn list_length(&self, key: &str) -> StateResult<usize>;

    /// Every entry of the list at `key`, in append order
    async fn list_read_all(&self, key: &str) -> StateResult<Vec<Vec<u8>>>;

    /// Remove `key`
    ///
    /// Returns `true` only when the key existed.
    async fn delete(&self, key: &str) -> StateResult<bool>;

    /// Set the time-to-live of `key`
    async fn expire(&self, key: &str, ttl: Duration) -> StateResult<()>;

    /// Read every entry and remove the key as one step
    ///
    /// Returns `None` when the key was already gone, which means another
    /// caller took it. The shared join uses this as its completion gate, so
    /// an append must never land between the read and the delete.
    async fn take_all(&self, key: &str) -> StateResult<Option<Vec<Vec<u8>>>>;
}
