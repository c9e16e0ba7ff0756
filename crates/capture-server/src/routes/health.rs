//! Health check endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Whether queued exports are being delivered.
    pub export_worker: bool,
}

/// GET /health - Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        export_worker: state.config().export_webhook_url.is_some(),
    })
}

/// Build health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
