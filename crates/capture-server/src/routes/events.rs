//! Server-Sent Events (SSE) endpoint for real-time notifications.
//!
//! Endpoint: GET /events
//!
//! Every [`CaptureEvent`] published by the engine is forwarded with its
//! `type` as the SSE event name:
//!
//! ```text
//! event: idea_suggested
//! data: {"type":"idea_suggested","suggestion":{...}}
//!
//! event: heartbeat
//! data: {"type":"heartbeat","timestamp":"..."}
//! ```
//!
//! A client that falls behind the broadcast buffer receives a `catchup`
//! event and should reload the pending topic, queue and suggestions.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use capture_engine::events::HEARTBEAT_INTERVAL_SECS;
use capture_engine::CaptureEvent;
use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

fn to_sse(event: &CaptureEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize event");
            None
        }
    }
}

/// GET /events - Subscribe to engine events.
async fn subscribe_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.engine().events().subscribe();
    tracing::info!("Client subscribed to SSE events");

    let stream = stream::unfold(receiver, |mut rx| async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(events_missed = count, "SSE client lagged, sending catchup event");
                    CaptureEvent::Catchup {
                        events_missed: count,
                        timestamp: Utc::now(),
                    }
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Event channel closed, ending SSE stream");
                    return None;
                }
            };
            if let Some(sse) = to_sse(&event) {
                return Some((Ok(sse), rx));
            }
        }
    });

    let heartbeat = CaptureEvent::Heartbeat {
        timestamp: Utc::now(),
    };
    let mut keep_alive = KeepAlive::new().interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    if let Some(event) = to_sse(&heartbeat) {
        keep_alive = keep_alive.event(event);
    }

    Sse::new(stream).keep_alive(keep_alive)
}

/// Build SSE event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events", get(subscribe_events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval() {
        assert_eq!(HEARTBEAT_INTERVAL_SECS, 30);
    }

    #[test]
    fn test_event_named_after_type() {
        let event = CaptureEvent::Catchup {
            events_missed: 3,
            timestamp: Utc::now(),
        };
        assert!(to_sse(&event).is_some());
        assert_eq!(event.name(), "catchup");
    }
}
