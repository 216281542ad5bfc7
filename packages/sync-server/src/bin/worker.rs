// Standalone worker process: claims jobs from the shared queue and applies
// them to the database under per-product locks. Any number of these can run
// side by side.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sync_core::kernel::jobs::{RedisJobQueue, SyncWorker};
use sync_core::kernel::{connect_kv, LockConfig, LockManager};
use sync_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period for in-flight jobs after a shutdown signal. Jobs slower than
/// this are left for the queue's stall timeout to redeliver.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sync_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting inventory sync worker");

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(2))
        .idle_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let queue_kv = connect_kv(&config.redis_url).await?;
    let lock_kv = connect_kv(&config.redis_url).await?;

    let queue = Arc::new(RedisJobQueue::new(queue_kv));
    let locks = Arc::new(LockManager::new(lock_kv, LockConfig::default()));
    let worker = Arc::new(SyncWorker::new(queue, locks, pool.clone()));

    let shutdown = CancellationToken::new();
    let worker_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    shutdown_signal().await;
    shutdown.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(result) => result.context("Worker task panicked")??,
        Err(_) => {
            tracing::warn!(
                "Drain timeout reached; unfinished jobs will be redelivered after the stall timeout"
            );
        }
    }

    pool.close().await;
    tracing::info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
