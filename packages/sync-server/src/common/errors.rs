//! Error taxonomy for the sync pipeline.
//!
//! Every failure that crosses a component boundary is one of these kinds.
//! Retriable failures travel up to the queue, which owns the retry schedule;
//! non-retriable failures are terminal at the worker.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Webhook HMAC mismatch or missing signature header.
    #[error("signature verification failed")]
    BadSignature,

    /// Payload failed adapter or canonical-schema validation.
    #[error("invalid payload: {0}")]
    BadPayload(String),

    /// Lock manager exhausted its retries for a product.
    #[error("could not acquire lock for {product_id} after {attempts} attempts")]
    LockUnavailable { product_id: String, attempts: u32 },

    /// Connection, serialization, or deadlock failure in storage.
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    /// Constraint violation in storage.
    #[error("permanent storage failure: {0}")]
    PermanentStorage(String),

    /// Marketplace B returned 5xx or the request failed outright.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Too many consecutive polling failures; cycle skipped.
    #[error("polling circuit is open")]
    CircuitOpen,

    /// The shared job store could not be reached.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl SyncError {
    /// Whether the queue should re-deliver a job that failed with this error.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SyncError::LockUnavailable { .. }
                | SyncError::TransientStorage(_)
                | SyncError::UpstreamUnavailable(_)
                | SyncError::QueueUnavailable(_)
        )
    }

    /// Classify a sqlx error into transient (retriable) or permanent storage failure.
    ///
    /// Serialization failures (40001) and deadlocks (40P01) are retriable;
    /// integrity violations (23xxx) are not. Anything else (pool timeouts,
    /// closed connections, protocol errors) is treated as transient.
    pub fn storage(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            if code == "40001" || code == "40P01" {
                return SyncError::TransientStorage(err.to_string());
            }
            if code.starts_with("23") {
                return SyncError::PermanentStorage(err.to_string());
            }
        }
        SyncError::TransientStorage(err.to_string())
    }

    /// Classify a key-value store error.
    pub fn queue(err: redis::RedisError) -> Self {
        SyncError::QueueUnavailable(err.to_string())
    }
}
