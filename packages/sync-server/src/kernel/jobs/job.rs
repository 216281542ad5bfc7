//! Job model for queued inventory updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::inventory::models::CanonicalRecord;

/// Delivery attempts before a job is terminally failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// First retry delay; doubles on each subsequent attempt.
pub const BACKOFF_BASE_MS: i64 = 2_000;

/// Width of one priority band in the waiting-set score. Creation timestamps
/// in milliseconds stay below this for centuries, so bands never overlap.
const PRIORITY_BAND: f64 = 1e13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// `{source}-{product_id}-{nanos}[-seq]`. Unique, operator-correlatable,
    /// and deliberately not a deduplication key: replays are tolerated
    /// because the upsert is idempotent.
    pub id: String,
    pub payload: CanonicalRecord,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub progress: u8,
    /// Waiting-set ordering, denormalized so the store's scripts can
    /// requeue without re-deriving it.
    #[serde(default)]
    pub order_score: f64,
}

impl SyncJob {
    pub fn new(payload: CanonicalRecord) -> Self {
        Self::build(payload, 0, None)
    }

    /// Constructor for batch enqueues: `seq` disambiguates jobs created in
    /// the same nanosecond.
    pub fn with_seq(payload: CanonicalRecord, seq: usize) -> Self {
        Self::build(payload, 0, Some(seq))
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self.order_score = Self::order_score_for(priority, self.created_at);
        self
    }

    fn build(payload: CanonicalRecord, priority: u8, seq: Option<usize>) -> Self {
        let created_at = Utc::now();
        let nanos = created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| created_at.timestamp_millis() * 1_000_000);
        let id = match seq {
            Some(seq) => format!("{}-{}-{}-{}", payload.source, payload.product_id, nanos, seq),
            None => format!("{}-{}-{}", payload.source, payload.product_id, nanos),
        };
        Self {
            id,
            priority,
            attempts_made: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at,
            next_run_at: None,
            state: JobState::Waiting,
            last_error: None,
            progress: 0,
            order_score: Self::order_score_for(priority, created_at),
            payload,
        }
    }

    /// Higher priority sorts into a lower band; within a band, FIFO by
    /// creation time.
    fn order_score_for(priority: u8, created_at: DateTime<Utc>) -> f64 {
        f64::from(u8::MAX - priority) * PRIORITY_BAND + created_at.timestamp_millis() as f64
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Exponential backoff for the attempt that just failed:
    /// `base * 2^(attempts_made - 1)`.
    pub fn backoff_delay(&self) -> chrono::Duration {
        let exponent = self.attempts_made.saturating_sub(1).min(16);
        chrono::Duration::milliseconds(BACKOFF_BASE_MS << exponent)
    }
}
