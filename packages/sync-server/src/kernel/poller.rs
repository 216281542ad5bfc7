//! Marketplace B delta-sync poller.
//!
//! One cycle: load cursor → fetch updates since it → normalize → enqueue →
//! advance cursor. The cursor only moves after the enqueue, so a crash in
//! between re-ingests the same window — duplicates are fine, the upsert is
//! idempotent.
//!
//! Three consecutive fetch failures open the circuit; cycles are then
//! skipped until a one-shot timer zeroes the counter 15 minutes later.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::common::SyncError;
use crate::domains::inventory::adapters::{MarketplaceBAdapter, SourceAdapter};
use crate::kernel::cursor::CursorStore;
use crate::kernel::jobs::{JobQueue, SyncJob};
use crate::kernel::marketplace_b::MarketplaceBClient;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Page size requested per cycle.
    pub page_limit: u32,
    /// Window fetched when no cursor exists yet.
    pub initial_lookback_secs: i64,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open.
    pub reset_after: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            page_limit: 100,
            initial_lookback_secs: 3_600,
            failure_threshold: 3,
            reset_after: Duration::from_secs(15 * 60),
        }
    }
}

/// What a cycle did, for logs and the diagnostic trigger endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PollOutcome {
    Completed(PollSummary),
    /// Another cycle was in flight; this one was skipped.
    AlreadyRunning,
    /// The circuit is open; no request was issued.
    CircuitOpen,
}

#[derive(Debug, Serialize)]
pub struct PollSummary {
    pub fetched: usize,
    pub enqueued: usize,
    pub cursor: i64,
}

pub struct MarketplaceBPoller {
    client: MarketplaceBClient,
    queue: Arc<dyn JobQueue>,
    cursor: Arc<dyn CursorStore>,
    config: PollerConfig,
    is_running: AtomicBool,
    consecutive_failures: Arc<AtomicU32>,
    reset_scheduled: Arc<AtomicBool>,
}

/// Clears the single-flight flag on every exit path.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MarketplaceBPoller {
    pub fn new(
        client: MarketplaceBClient,
        queue: Arc<dyn JobQueue>,
        cursor: Arc<dyn CursorStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            client,
            queue,
            cursor,
            config,
            is_running: AtomicBool::new(false),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            reset_scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Run one polling cycle. `Err` means the cycle itself failed; skips
    /// (single-flight, circuit open) are reported as outcomes, not errors.
    pub async fn run_cycle(&self) -> Result<PollOutcome, SyncError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            tracing::debug!("poll cycle already in progress; skipping");
            return Ok(PollOutcome::AlreadyRunning);
        }
        let _guard = CycleGuard(&self.is_running);

        if self.consecutive_failures.load(Ordering::SeqCst) >= self.config.failure_threshold {
            self.schedule_reset();
            tracing::warn!(
                failures = self.consecutive_failures.load(Ordering::SeqCst),
                "circuit open; skipping poll cycle"
            );
            return Ok(PollOutcome::CircuitOpen);
        }

        let cycle_start = Utc::now().timestamp();
        let since = self
            .cursor
            .load()
            .await?
            .unwrap_or(cycle_start - self.config.initial_lookback_secs);

        let items = match self
            .client
            .fetch_updates(since, self.config.page_limit)
            .await
        {
            Ok(items) => items,
            Err(error) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(%error, failures, "marketplace poll failed");
                return Err(error);
            }
        };

        let records = MarketplaceBAdapter.transform_batch(&items);
        let jobs: Vec<SyncJob> = records
            .into_iter()
            .enumerate()
            .map(|(seq, record)| SyncJob::with_seq(record, seq))
            .collect();
        let enqueued = jobs.len();
        if !jobs.is_empty() {
            self.queue.add_batch(jobs).await?;
        }

        self.cursor.store(cycle_start).await?;
        self.consecutive_failures.store(0, Ordering::SeqCst);

        tracing::info!(fetched = items.len(), enqueued, cursor = cycle_start, "poll cycle complete");
        Ok(PollOutcome::Completed(PollSummary {
            fetched: items.len(),
            enqueued,
            cursor: cycle_start,
        }))
    }

    /// Arm the one-shot circuit reset, if not already armed. The failure
    /// counter stays untouched until the timer fires.
    fn schedule_reset(&self) {
        if self.reset_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let failures = self.consecutive_failures.clone();
        let scheduled = self.reset_scheduled.clone();
        let reset_after = self.config.reset_after;
        tokio::spawn(async move {
            tokio::time::sleep(reset_after).await;
            failures.store(0, Ordering::SeqCst);
            scheduled.store(false, Ordering::SeqCst);
            tracing::info!("polling circuit closed; resuming cycles");
        });
    }
}
