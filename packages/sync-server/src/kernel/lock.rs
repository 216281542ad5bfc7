//! Per-product distributed lock over the shared key-value store.
//!
//! One key per product (`lock:inventory:{product_id}`), a random nonce as
//! the value, and a TTL so a dead holder never wedges the fleet. Release and
//! extension are compare-and-set against the nonce: after a TTL-expiry
//! handoff a stale holder must not be able to delete its successor's lock.
//!
//! At most one holder of a product's lock is ever observable, modulo clock
//! drift bounded by `drift_factor * ttl`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::common::SyncError;

/// Delete the key iff it still holds our nonce.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Re-arm the TTL iff the key still holds our nonce.
const EXTEND_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub ttl: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub jitter_max: Duration,
    /// Fraction of the TTL assumed lost to clock drift between holders.
    pub drift_factor: f64,
    /// Extend when this close to nominal expiry.
    pub extension_threshold: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(10_000),
            retries: 5,
            retry_delay: Duration::from_millis(200),
            jitter_max: Duration::from_millis(100),
            drift_factor: 0.01,
            extension_threshold: Duration::from_millis(500),
        }
    }
}

impl LockConfig {
    /// TTL usable for work: the raw TTL minus the drift allowance.
    pub fn nominal_ttl(&self) -> Duration {
        let drift = self.ttl.mul_f64(self.drift_factor) + Duration::from_millis(2);
        self.ttl.saturating_sub(drift)
    }
}

pub struct LockManager {
    redis: ConnectionManager,
    config: LockConfig,
}

impl LockManager {
    pub fn new(redis: ConnectionManager, config: LockConfig) -> Self {
        Self { redis, config }
    }

    fn key(product_id: &str) -> String {
        format!("lock:inventory:{product_id}")
    }

    /// Acquire the product's lock, run `work`, release on every exit path.
    ///
    /// While `work` runs, a guard task re-arms the TTL whenever it comes
    /// within `extension_threshold` of nominal expiry, so work longer than
    /// one TTL keeps its exclusion. Acquisition failure after all retries is
    /// `LockUnavailable`, which the queue retries with backoff.
    pub async fn with_lock<F, Fut, T>(&self, product_id: &str, work: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let key = Self::key(product_id);
        let nonce = Uuid::new_v4().to_string();

        let attempts = self.config.retries + 1;
        let mut acquired = false;
        for attempt in 0..attempts {
            match self.try_acquire(&key, &nonce).await {
                Ok(true) => {
                    acquired = true;
                    break;
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%key, %error, "lock store error during acquisition");
                }
            }
            if attempt + 1 < attempts {
                let jitter_ms = rand::thread_rng()
                    .gen_range(0..=self.config.jitter_max.as_millis() as u64);
                tokio::time::sleep(self.config.retry_delay + Duration::from_millis(jitter_ms))
                    .await;
            }
        }
        if !acquired {
            return Err(SyncError::LockUnavailable {
                product_id: product_id.to_string(),
                attempts,
            });
        }

        let guard_cancel = CancellationToken::new();
        let guard = tokio::spawn(Self::extension_guard(
            self.redis.clone(),
            self.config.clone(),
            key.clone(),
            nonce.clone(),
            guard_cancel.clone(),
        ));

        let result = work().await;

        guard_cancel.cancel();
        let _ = guard.await;
        self.release(&key, &nonce).await;

        result
    }

    async fn try_acquire(&self, key: &str, nonce: &str) -> Result<bool, redis::RedisError> {
        let mut con = self.redis.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(nonce)
            .arg("NX")
            .arg("PX")
            .arg(self.config.ttl.as_millis() as u64)
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, nonce: &str) {
        let mut con = self.redis.clone();
        let released: Result<i64, redis::RedisError> = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(nonce)
            .invoke_async(&mut con)
            .await;
        match released {
            Ok(1) => {}
            // 0: the TTL already expired and someone else may hold the key
            // now. Nothing to release; never delete blindly.
            Ok(_) => tracing::warn!(%key, "lock already expired at release"),
            Err(error) => tracing::warn!(%key, %error, "failed to release lock"),
        }
    }

    /// Background TTL refresher, cancelled when the work future resolves.
    async fn extension_guard(
        redis: ConnectionManager,
        config: LockConfig,
        key: String,
        nonce: String,
        cancel: CancellationToken,
    ) {
        let refresh_in = config
            .nominal_ttl()
            .saturating_sub(config.extension_threshold);
        let mut con = redis;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(refresh_in) => {
                    let extended: Result<i64, redis::RedisError> = Script::new(EXTEND_SCRIPT)
                        .key(&key)
                        .arg(&nonce)
                        .arg(config.ttl.as_millis() as u64)
                        .invoke_async(&mut con)
                        .await;
                    match extended {
                        Ok(1) => tracing::debug!(%key, "extended lock ttl"),
                        Ok(_) => {
                            tracing::warn!(%key, "lock lost before extension");
                            break;
                        }
                        Err(error) => {
                            tracing::warn!(%key, %error, "failed to extend lock");
                            break;
                        }
                    }
                }
            }
        }
    }
}
