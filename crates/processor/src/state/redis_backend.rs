//! Redis list store
//!
//! [`ListStore`] over a Redis multiplexed [`ConnectionManager`]. The manager
//! is cheap to clone and reconnects on its own, so one store is shared by
//! every controller in the process.
//!
//! Single-key operations are retried with exponential backoff. `take_all`
//! runs `LRANGE` and `DEL` in one `MULTI`/`EXEC` block and is never retried:
//! a transaction that failed after executing must not be replayed.

use async_trait::async_trait;
use fanin_config::RedisSettings;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::backend::ListStore;
use crate::error::{StateError, StateResult};

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Attempts per operation
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Maximum delay between retries
    pub retry_max_delay: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Build from worker settings; `None` when no URL is configured
    pub fn from_settings(settings: &RedisSettings) -> Option<Self> {
        let url = settings.url.as_deref().filter(|u| !u.is_empty())?;
        Some(Self {
            url: url.to_string(),
            max_retries: settings.max_retries.max(1),
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(settings.retry_max_delay_ms),
        })
    }
}

fn storage_error(details: String) -> StateError {
    StateError::StorageError {
        backend_type: "redis".to_string(),
        details,
    }
}

/// Redis-backed list store
#[derive(Clone)]
pub struct RedisListStore {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisListStore {
    /// Open a client, establish the managed connection and ping the server
    pub async fn connect(config: RedisConfig) -> StateResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| storage_error(format!("Failed to create client: {}", e)))?;

        let mut connection = ConnectionManager::new(client)
            .await
            .map_err(|e| storage_error(format!("Connection failed: {}", e)))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| storage_error(format!("Health check failed: {}", e)))?;
        debug!(response = %pong, "Redis connection established");

        Ok(Self { connection, config })
    }

    /// Execute operation with retry logic
    async fn with_retry<F, Fut, T>(&self, op: &str, mut operation: F) -> StateResult<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let mut retries = 0;
        let mut delay = self.config.retry_base_delay;

        loop {
            match operation(self.connection.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    retries += 1;
                    if retries >= self.config.max_retries {
                        error!("{} failed after {} retries: {}", op, retries, e);
                        return Err(storage_error(format!(
                            "{} failed after {} retries: {}",
                            op, retries, e
                        )));
                    }

                    warn!("{} attempt {} failed: {}, retrying in {:?}", op, retries, e, delay);
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.retry_max_delay);
                }
            }
        }
    }
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn list_append(&self, key: &str, value: &[u8]) -> StateResult<usize> {
        self.with_retry("RPUSH", |mut conn| async move {
            redis::cmd("RPUSH").arg(key).arg(value).query_async(&mut conn).await
        })
        .await
    }

    async fn list_length(&self, key: &str) -> StateResult<usize> {
        self.with_retry("LLEN", |mut conn| async move {
            redis::cmd("LLEN").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn list_read_all(&self, key: &str) -> StateResult<Vec<Vec<u8>>> {
        self.with_retry("LRANGE", |mut conn| async move {
            redis::cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        let removed: i64 = self
            .with_retry("DEL", |mut conn| async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StateResult<()> {
        let secs = ttl.as_secs().max(1);
        let _: i64 = self
            .with_retry("EXPIRE", |mut conn| async move {
                redis::cmd("EXPIRE").arg(key).arg(secs).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }

    async fn take_all(&self, key: &str) -> StateResult<Option<Vec<Vec<u8>>>> {
        let mut conn = self.connection.clone();
        let (values, removed): (Vec<Vec<u8>>, i64) = redis::pipe()
            .atomic()
            .cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| storage_error(format!("LRANGE/DEL transaction failed: {}", e)))?;

        if removed > 0 {
            Ok(Some(values))
        } else {
            Ok(None)
        }
    }
}
