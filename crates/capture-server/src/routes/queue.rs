//! Export queue endpoints.
//!
//! The queue is passive: these endpoints let an external processor (or the
//! built-in worker's operator) inspect jobs and drive their transitions.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use capture_core::{ExportJob, JobPatch, JobStatus};
use capture_engine::{ExportRequest, SubmitOutcome};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for `GET /queue`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
}

/// Body of `POST /queue/{id}/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: JobStatus,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Body of `POST /queue/{id}/retry`.
#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub error: String,
}

fn job_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Export job {} not found", id))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /queue - List jobs, optionally by status.
async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ExportJob>>> {
    Ok(Json(state.engine().queue().list_jobs(params.status).await?))
}

/// POST /queue - Submit an export (deduplicated).
///
/// 201 when queued, 200 with `outcome: "duplicate"` when suppressed.
async fn submit(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<(StatusCode, Json<SubmitOutcome>)> {
    if request.notebook_ref.trim().is_empty() {
        return Err(ApiError::BadRequest("notebookRef is required".to_string()));
    }
    let outcome = state.engine().submit_export(request).await?;
    let status = match outcome {
        SubmitOutcome::Enqueued { .. } => StatusCode::CREATED,
        SubmitOutcome::Duplicate { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// GET /queue/{id} - One job.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExportJob>> {
    state
        .engine()
        .queue()
        .get_job(id)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

/// PATCH /queue/{id} - Merge-patch a job (last write wins).
async fn patch_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<JobPatch>,
) -> ApiResult<Json<ExportJob>> {
    state
        .engine()
        .queue()
        .update_job(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

/// POST /queue/{id}/status - Status transition.
async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<ExportJob>> {
    state
        .engine()
        .queue()
        .update_job_status(id, request.status, request.last_error)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

/// POST /queue/{id}/retry - Record a failed delivery.
async fn retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Json<ExportJob>> {
    state
        .engine()
        .queue()
        .schedule_retry(id, &request.error)
        .await?
        .map(Json)
        .ok_or_else(|| job_not_found(id))
}

/// DELETE /queue/{id} - Cancel a job.
async fn remove_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match state.engine().queue().dequeue_job(id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(job_not_found(id)),
    }
}

/// Build export queue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_jobs).post(submit))
        .route(
            "/queue/{id}",
            get(get_job).patch(patch_job).delete(remove_job),
        )
        .route("/queue/{id}/status", post(set_status))
        .route("/queue/{id}/retry", post(retry))
}
