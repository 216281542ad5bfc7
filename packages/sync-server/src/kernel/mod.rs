//! Shared infrastructure: distributed locks, the job queue, the poller, and
//! the key-value store connections they ride on.

pub mod cursor;
pub mod jobs;
pub mod lock;
pub mod marketplace_b;
pub mod poller;
pub mod scheduled_tasks;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

pub use cursor::{CursorStore, RedisCursorStore};
pub use lock::{LockConfig, LockManager};
pub use marketplace_b::MarketplaceBClient;
pub use poller::{MarketplaceBPoller, PollOutcome, PollerConfig};

/// Open a managed connection to the shared key-value store.
///
/// Each subsystem (queue, locks, cursor) gets its own connection so that
/// blocking commands in one cannot stall another.
pub async fn connect_kv(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).context("Invalid Redis URL")?;
    ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")
}
