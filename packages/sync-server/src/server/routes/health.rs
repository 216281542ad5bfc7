use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::kernel::jobs::{JobQueue, QueueStats};
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: ComponentHealth,
    key_value_store: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<QueueStats>,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentHealth {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(error.into()),
        }
    }
}

/// Health check endpoint
///
/// Probes the database and the key-value store with short timeouts and
/// reports queue depths. Returns 200 OK if both dependencies respond,
/// 503 Service Unavailable otherwise.
async fn ping_kv(
    mut kv: redis::aio::ConnectionManager,
) -> Result<String, redis::RedisError> {
    redis::cmd("PING").query_async(&mut kv).await
}

pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        sqlx::query("SELECT 1").execute(&state.db_pool),
    )
    .await
    {
        Ok(Ok(_)) => ComponentHealth::ok(),
        Ok(Err(e)) => ComponentHealth::error(format!("Query failed: {e}")),
        Err(_) => ComponentHealth::error("Query timeout (>2s)"),
    };

    let kv_health = match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        ping_kv(state.kv_probe.clone()),
    )
    .await
    {
        Ok(Ok(_)) => ComponentHealth::ok(),
        Ok(Err(e)) => ComponentHealth::error(format!("Ping failed: {e}")),
        Err(_) => ComponentHealth::error("Ping timeout (>2s)"),
    };

    let queue = state.queue.stats().await.ok();

    let is_healthy = db_health.status == "ok" && kv_health.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            key_value_store: kv_health,
            queue,
        }),
    )
}
