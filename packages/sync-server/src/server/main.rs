// Main entry point for the ingestion API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sync_core::kernel::jobs::{JobQueue, RedisJobQueue};
use sync_core::kernel::scheduled_tasks::start_scheduler;
use sync_core::kernel::{
    connect_kv, MarketplaceBClient, MarketplaceBPoller, PollerConfig, RedisCursorStore,
};
use sync_core::server::{build_app, AppState};
use sync_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sync_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Unified Inventory Synchronizer");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(2))
        .idle_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // One key-value connection per subsystem so blocking commands in one
    // cannot starve another.
    let queue_kv = connect_kv(&config.redis_url).await?;
    let cursor_kv = connect_kv(&config.redis_url).await?;

    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(queue_kv.clone()));

    let poller = Arc::new(MarketplaceBPoller::new(
        MarketplaceBClient::new(
            config.marketplace_b_api.as_str(),
            config.marketplace_b_api_key.as_str(),
        )?,
        queue.clone(),
        Arc::new(RedisCursorStore::new(cursor_kv)),
        PollerConfig::default(),
    ));

    let mut scheduler = start_scheduler(poller.clone()).await?;

    let state = AppState {
        db_pool: pool.clone(),
        queue,
        poller,
        kv_probe: queue_kv,
        webhook_secret: config.marketplace_a_secret.clone(),
    };
    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain: stop scheduling new cycles, then tear down the pool.
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    pool.close().await;
    tracing::info!("Shutdown complete");

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
