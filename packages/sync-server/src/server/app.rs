//! Application setup and router construction.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::JobQueue;
use crate::kernel::MarketplaceBPoller;
use crate::server::routes::{
    get_inventory, get_inventory_audit, health_handler, marketplace_a_webhook, trigger_poll,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub queue: Arc<dyn JobQueue>,
    pub poller: Arc<MarketplaceBPoller>,
    /// Connection used only by the health probe.
    pub kv_probe: ConnectionManager,
    pub webhook_secret: String,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/webhooks/marketplace-a", post(marketplace_a_webhook))
        .route("/inventory/:product_id", get(get_inventory))
        .route("/inventory/:product_id/audit", get(get_inventory_audit))
        .route("/trigger-poll", post(trigger_poll))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
