//! Routing endpoints.
//!
//! - `POST /route`: capture → routing decision
//! - `POST /capture`: routing decision plus incubator evaluation
//! - `POST /actions`: the user's answer to a decision

use axum::{Json, Router, extract::State, routing::post};
use capture_core::{ActionOutcome, CaptureContext, RouteAction, RouteOptions, RouterResult};
use capture_engine::CaptureOutcome;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /route` and `POST /capture`.
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    /// The captured fragment.
    pub capture: CaptureContext,
    /// Routing options; `maxAlternatives` falls back to the engine setting.
    #[serde(default)]
    pub options: Option<RouteOptions>,
}

impl RouteRequest {
    fn options(&self, state: &AppState) -> RouteOptions {
        self.options.unwrap_or(RouteOptions {
            max_alternatives: state.engine().config().max_alternatives,
            ..RouteOptions::default()
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /route - Route one capture.
async fn route_capture(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<Json<RouterResult>> {
    let options = request.options(&state);
    let result = state.engine().route(&request.capture, options).await?;
    Ok(Json(result))
}

/// POST /capture - Route one capture and feed it to the incubator.
async fn capture(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<Json<CaptureOutcome>> {
    let options = request.options(&state);
    let outcome = state.engine().capture(&request.capture, options).await?;
    Ok(Json(outcome))
}

/// POST /actions - Apply a routing action.
///
/// The body is a tagged action: `{"action": "save", "data": {...}}`.
async fn apply_action(
    State(state): State<AppState>,
    Json(action): Json<RouteAction>,
) -> ApiResult<Json<ActionOutcome>> {
    let outcome = state.engine().handle_action(action).await?;
    Ok(Json(outcome))
}

/// Build routing routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/route", post(route_capture))
        .route("/capture", post(capture))
        .route("/actions", post(apply_action))
}
