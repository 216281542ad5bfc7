//! Worker loop: dequeue → lock → upsert → ack or fail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::common::SyncError;
use crate::domains::inventory::models::InventoryRow;
use crate::kernel::lock::LockManager;

use super::events::JobEvent;
use super::job::SyncJob;
use super::queue::JobQueue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed in parallel by this process.
    pub concurrency: usize,
    /// Sleep between claims when the queue is empty.
    pub poll_interval: Duration,
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(1_000),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

pub struct SyncWorker {
    queue: Arc<dyn JobQueue>,
    locks: Arc<LockManager>,
    pool: PgPool,
    config: WorkerConfig,
    events: broadcast::Sender<JobEvent>,
}

impl SyncWorker {
    pub fn new(queue: Arc<dyn JobQueue>, locks: Arc<LockManager>, pool: PgPool) -> Self {
        Self::with_config(queue, locks, pool, WorkerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        locks: Arc<LockManager>,
        pool: PgPool,
        config: WorkerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            queue,
            locks,
            pool,
            config,
            events,
        }
    }

    /// Telemetry stream of job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Claim-and-process loop until `shutdown` fires. Each claimed batch
    /// finishes before the cancellation is observed, so in-flight jobs drain
    /// naturally; anything slower than the caller's grace period is left for
    /// the stall timeout to redeliver.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            "sync worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let jobs = match self
                .queue
                .claim(&self.config.worker_id, self.config.concurrency)
                .await
            {
                Ok(jobs) => jobs,
                Err(error) => {
                    tracing::error!(%error, "failed to claim jobs");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            tracing::debug!(count = jobs.len(), "claimed jobs");

            let handles: Vec<_> = jobs
                .into_iter()
                .map(|job| self.process_job(job))
                .collect();
            futures::future::join_all(handles).await;
        }

        tracing::info!(worker_id = %self.config.worker_id, "sync worker stopped");
        Ok(())
    }

    async fn process_job(&self, job: SyncJob) {
        let started = Instant::now();
        let job_id = job.id.clone();
        let product_id = job.payload.product_id.clone();
        let attempt = job.attempts_made;

        let _ = self.events.send(JobEvent::Started {
            job_id: job_id.clone(),
            product_id: product_id.clone(),
            attempt,
        });

        match self.execute(&job).await {
            Ok(row) => {
                tracing::debug!(%job_id, %product_id, quantity = row.quantity, "job succeeded");
                if let Err(error) = self.queue.ack(&job_id).await {
                    tracing::error!(%job_id, %error, "failed to ack job");
                }
                let _ = self.events.send(JobEvent::Completed {
                    job_id,
                    product_id,
                    quantity: row.quantity,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(error) => {
                let retriable = error.is_retriable();
                let will_retry = retriable && job.has_attempts_left();
                tracing::warn!(%job_id, %product_id, %error, will_retry, "job failed");
                if let Err(error) = self.queue.fail(&job_id, &error.to_string(), retriable).await
                {
                    tracing::error!(%job_id, %error, "failed to mark job as failed");
                }
                let _ = self.events.send(JobEvent::Failed {
                    job_id,
                    product_id,
                    error: error.to_string(),
                    attempt,
                    will_retry,
                });
            }
        }
    }

    /// Validate, then upsert under the product's lock. The lock is acquired
    /// before the transaction opens and released after commit; locks never
    /// nest.
    async fn execute(&self, job: &SyncJob) -> Result<InventoryRow, SyncError> {
        let record = &job.payload;
        record.validate()?;

        let _ = self.events.send(JobEvent::Progress {
            job_id: job.id.clone(),
            percent: 50,
        });

        let pool = self.pool.clone();
        let record = record.clone();
        self.locks
            .with_lock(&job.payload.product_id, move || async move {
                InventoryRow::upsert_record(&record, &pool).await
            })
            .await
    }
}
