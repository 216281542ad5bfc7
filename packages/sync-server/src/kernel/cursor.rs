//! Poll cursor for Marketplace B delta sync.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::common::SyncError;

/// Key in the shared store holding the last successful cycle start, Unix seconds.
pub const CURSOR_KEY: &str = "marketplace_b:last_timestamp";

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self) -> Result<Option<i64>, SyncError>;
    async fn store(&self, timestamp: i64) -> Result<(), SyncError>;
}

pub struct RedisCursorStore {
    redis: ConnectionManager,
}

impl RedisCursorStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CursorStore for RedisCursorStore {
    async fn load(&self) -> Result<Option<i64>, SyncError> {
        let mut con = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(CURSOR_KEY)
            .query_async(&mut con)
            .await
            .map_err(|e| SyncError::TransientStorage(e.to_string()))?;
        match raw {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| SyncError::TransientStorage(format!("corrupt poll cursor: {raw}"))),
            None => Ok(None),
        }
    }

    async fn store(&self, timestamp: i64) -> Result<(), SyncError> {
        let mut con = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(CURSOR_KEY)
            .arg(timestamp)
            .query_async(&mut con)
            .await
            .map_err(|e| SyncError::TransientStorage(e.to_string()))?;
        Ok(())
    }
}
