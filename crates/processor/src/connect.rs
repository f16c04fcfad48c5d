//! Startup connection retry
//!
//! Broker and store clients are created in `main`. A client that cannot
//! reach its backend is retried forever with a fixed delay, so a worker
//! started before its dependencies simply waits for them.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Run `connect` until it succeeds or shutdown is requested
///
/// Every failed attempt is logged at ERROR and followed by a fixed `delay`.
/// Returns `None` when shutdown arrives first.
pub async fn connect_with_retry<T, E, F, Fut>(
    what: &str,
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
    mut connect: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut attempt: u64 = 0;
    loop {
        if *shutdown.borrow() {
            return None;
        }

        attempt += 1;
        match connect().await {
            Ok(client) => {
                info!(attempt, "{} connected", what);
                return Some(client);
            }
            Err(e) => {
                error!(attempt, error = %e, "Failed to connect {}, retrying in {:?}", what, delay);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
        }
    }
}
