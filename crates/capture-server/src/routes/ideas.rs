//! Idea incubator endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use capture_core::{
    CaptureContext, Cooldown, DismissKind, IdeaEvaluation, IdeaSuggestion, SuggestionStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for `GET /ideas`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<SuggestionStatus>,
}

/// Body of `PATCH /ideas/{id}`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: SuggestionStatus,
}

/// Body of `POST /ideas/dismiss`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissRequest {
    pub topic_key: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: DismissKind,
}

/// Response of `DELETE /ideas/cooldowns/{topic_key}`.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// False if no "don't ask" cooldown was set.
    pub reset: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /ideas/evaluate - Record a capture without routing it.
async fn evaluate(
    State(state): State<AppState>,
    Json(capture): Json<CaptureContext>,
) -> ApiResult<Json<IdeaEvaluation>> {
    Ok(Json(state.engine().incubator().evaluate(&capture).await?))
}

/// GET /ideas - List suggestions.
async fn list_suggestions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<IdeaSuggestion>>> {
    Ok(Json(
        state
            .engine()
            .incubator()
            .list_suggestions(params.status)
            .await?,
    ))
}

/// PATCH /ideas/{id} - Accept or dismiss a suggestion.
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<IdeaSuggestion>> {
    state
        .engine()
        .incubator()
        .update_idea_suggestion_status(id, request.status)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Suggestion {} not found", id)))
}

/// POST /ideas/dismiss - "Not now" or "don't ask again" for a topic.
async fn dismiss(
    State(state): State<AppState>,
    Json(request): Json<DismissRequest>,
) -> ApiResult<Json<Cooldown>> {
    if request.topic_key.trim().is_empty() {
        return Err(ApiError::BadRequest("topicKey is required".to_string()));
    }
    let cooldown = state
        .engine()
        .incubator()
        .record_idea_dismiss(request.topic_key.trim(), request.kind)
        .await?;
    Ok(Json(cooldown))
}

/// GET /ideas/cooldowns/{topic_key} - Current suppression state.
async fn get_cooldown(
    State(state): State<AppState>,
    Path(topic_key): Path<String>,
) -> ApiResult<Json<Cooldown>> {
    Ok(Json(
        state.engine().incubator().get_cooldown(&topic_key).await?,
    ))
}

/// DELETE /ideas/cooldowns/{topic_key} - Lift "don't ask again".
async fn reset_cooldown(
    State(state): State<AppState>,
    Path(topic_key): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    let reset = state
        .engine()
        .incubator()
        .reset_cooldown(&topic_key)
        .await?;
    Ok(Json(ResetResponse { reset }))
}

/// Build idea incubator routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ideas", get(list_suggestions))
        .route("/ideas/evaluate", post(evaluate))
        .route("/ideas/dismiss", post(dismiss))
        .route("/ideas/{id}", patch(update_status))
        .route(
            "/ideas/cooldowns/{topic_key}",
            get(get_cooldown).delete(reset_cooldown),
        )
}
