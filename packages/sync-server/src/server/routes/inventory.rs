//! Read-only inventory queries.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::common::ApiResponse;
use crate::domains::inventory::models::{AuditRow, InventoryRow};
use crate::server::app::AppState;

pub async fn get_inventory(
    Extension(state): Extension<AppState>,
    Path(product_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<Vec<InventoryRow>>>) {
    match InventoryRow::find_by_product(&product_id, &state.db_pool).await {
        Ok(rows) => (StatusCode::OK, Json(ApiResponse::ok(rows))),
        Err(error) => {
            tracing::error!(%error, %product_id, "inventory lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("inventory lookup failed")),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<i64>,
}

pub async fn get_inventory_audit(
    Extension(state): Extension<AppState>,
    Path(product_id): Path<String>,
    Query(params): Query<AuditParams>,
) -> (StatusCode, Json<ApiResponse<Vec<AuditRow>>>) {
    let limit = params
        .limit
        .unwrap_or(AuditRow::DEFAULT_LIMIT)
        .clamp(1, 1_000);
    match AuditRow::find_by_product(&product_id, limit, &state.db_pool).await {
        Ok(rows) => (StatusCode::OK, Json(ApiResponse::ok(rows))),
        Err(error) => {
            tracing::error!(%error, %product_id, "audit lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("audit lookup failed")),
            )
        }
    }
}
