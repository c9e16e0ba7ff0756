//! Registry and pending-topic endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use capture_core::{PendingTopic, RegistryEntry, RegistrySource, RegistryUpsert};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /registry`. Entries written here are always manual.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRequest {
    pub topic_key: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub notebook_ref: String,
    #[serde(default)]
    pub notebook_url: String,
}

/// Body of `POST /registry/observe`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserveRequest {
    pub notebook_ref: String,
    #[serde(default)]
    pub notebook_url: String,
}

/// Response of `POST /registry/observe`.
#[derive(Debug, Serialize)]
pub struct ObserveResponse {
    /// The learned entry, if a pending topic was waiting.
    pub entry: Option<RegistryEntry>,
}

/// Response of `GET /pending`.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending: Option<PendingTopic>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /registry - List every mapping.
async fn list_entries(State(state): State<AppState>) -> ApiResult<Json<Vec<RegistryEntry>>> {
    Ok(Json(state.engine().registry().list_entries().await?))
}

/// POST /registry - Create or refresh a mapping by hand.
async fn upsert_entry(
    State(state): State<AppState>,
    Json(request): Json<UpsertRequest>,
) -> ApiResult<Json<RegistryEntry>> {
    let entry = state
        .engine()
        .registry()
        .upsert_entry(RegistryUpsert {
            topic_key: request.topic_key,
            display_title: request.display_title,
            keywords: request.keywords,
            notebook_ref: request.notebook_ref,
            notebook_url: request.notebook_url,
            source: RegistrySource::Manual,
        })
        .await?;
    Ok(Json(entry))
}

/// DELETE /registry/{topic_key} - Remove a mapping.
async fn delete_entry(
    State(state): State<AppState>,
    Path(topic_key): Path<String>,
) -> ApiResult<StatusCode> {
    if state.engine().registry().delete_entry(&topic_key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No registry entry for {}", topic_key)))
    }
}

/// POST /registry/observe - Learn the pending topic from an observed export.
async fn observe(
    State(state): State<AppState>,
    Json(request): Json<ObserveRequest>,
) -> ApiResult<Json<ObserveResponse>> {
    let entry = state
        .engine()
        .observe_destination(&request.notebook_ref, &request.notebook_url)
        .await?;
    Ok(Json(ObserveResponse { entry }))
}

/// GET /pending - The topic awaiting a destination.
async fn get_pending(State(state): State<AppState>) -> ApiResult<Json<PendingResponse>> {
    let pending = state.engine().registry().get_pending_topic().await?;
    Ok(Json(PendingResponse { pending }))
}

/// Build registry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/registry", get(list_entries).post(upsert_entry))
        .route("/registry/observe", post(observe))
        .route("/registry/{topic_key}", delete(delete_entry))
        .route("/pending", get(get_pending))
}
