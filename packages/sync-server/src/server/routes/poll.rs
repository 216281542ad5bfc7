//! Diagnostic trigger: run one polling cycle synchronously.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;

use crate::common::{ApiResponse, SyncError};
use crate::kernel::PollOutcome;
use crate::server::app::AppState;

pub async fn trigger_poll(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<ApiResponse<PollOutcome>>) {
    match state.poller.run_cycle().await {
        Ok(outcome @ PollOutcome::Completed(_)) => (StatusCode::OK, Json(ApiResponse::ok(outcome))),
        Ok(outcome @ PollOutcome::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::ok_with_message(
                "a poll cycle is already in progress",
                outcome,
            )),
        ),
        Ok(outcome @ PollOutcome::CircuitOpen) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::ok_with_message(
                "polling circuit is open",
                outcome,
            )),
        ),
        Err(error @ SyncError::UpstreamUnavailable(_)) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error(error.to_string())),
        ),
        Err(error) => {
            tracing::error!(%error, "triggered poll cycle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(error.to_string())),
            )
        }
    }
}
