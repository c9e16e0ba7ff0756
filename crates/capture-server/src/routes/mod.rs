//! Route definitions for the HTTP API.

pub mod events;
pub mod health;
pub mod ideas;
pub mod queue;
pub mod registry;
pub mod routing;

use axum::Router;

use crate::state::AppState;

/// Build the complete router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(routing::routes())
        .merge(registry::routes())
        .merge(queue::routes())
        .merge(ideas::routes())
        .merge(events::routes())
        .with_state(state)
}
