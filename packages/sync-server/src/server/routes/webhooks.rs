//! Marketplace A webhook receiver.

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use crate::common::signature::{self, SIGNATURE_HEADER};
use crate::common::ApiResponse;
use crate::domains::inventory::adapters::{MarketplaceAAdapter, SourceAdapter};
use crate::kernel::jobs::{JobQueue, SyncJob};
use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookData {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
}

/// Verify, normalize, enqueue, acknowledge.
///
/// The signature is checked against the raw body bytes before any JSON
/// parsing: parsing first and re-serializing would normalize whitespace and
/// break the digest.
pub async fn marketplace_a_webhook(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse<WebhookData>>) {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if signature::verify(&state.webhook_secret, &body, provided).is_err() {
        tracing::warn!("webhook rejected: bad or missing signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("invalid signature")),
        );
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("invalid JSON body: {error}"))),
            );
        }
    };

    let record = match MarketplaceAAdapter.transform(&raw) {
        Ok(record) => record,
        Err(error) => {
            tracing::warn!(%error, "webhook payload failed normalization");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(error.to_string())),
            );
        }
    };

    let job = SyncJob::new(record);
    let product_id = job.payload.product_id.clone();
    match state.queue.add(job).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::ok_with_message(
                "update accepted",
                WebhookData { job_id, product_id },
            )),
        ),
        Err(error) => {
            tracing::error!(%error, %product_id, "failed to enqueue webhook update");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("failed to enqueue update")),
            )
        }
    }
}
