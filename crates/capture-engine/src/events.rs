//! Event broadcasting for state changes.
//!
//! Components publish an event whenever they change durable state that a
//! reading surface may want to reflect: a pending topic staged or cleared,
//! a registry mapping learned, an export job queued or moved, an idea
//! suggested. Subscribers (the SSE endpoint, tests) receive every event
//! published after they subscribe.
//!
//! # Architecture
//!
//! - One `tokio::sync::broadcast` channel shared by all publishers
//! - Publishing with no subscribers is a no-op, never an error
//! - Slow subscribers that fall behind see `RecvError::Lagged` and should
//!   resync from the store; the server turns that into a `catchup` event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use capture_core::{ExportJob, IdeaSuggestion, PendingTopic, RegistryEntry};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Heartbeat interval in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// An event that can be broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// The pending-topic slot was written.
    PendingTopicSaved { pending: PendingTopic },
    /// The pending-topic slot was emptied.
    PendingTopicCleared {
        #[serde(rename = "topicKey")]
        topic_key: Option<String>,
    },
    /// A registry entry was created or changed.
    RegistryUpdated { entry: RegistryEntry },
    /// A registry entry was deleted.
    RegistryDeleted {
        #[serde(rename = "topicKey")]
        topic_key: String,
    },
    /// An export job was appended to the queue.
    JobEnqueued { job: ExportJob },
    /// An export job changed status or was patched.
    JobUpdated { job: ExportJob },
    /// The incubator produced a new suggestion.
    IdeaSuggested { suggestion: IdeaSuggestion },
    /// Periodic keep-alive.
    Heartbeat { timestamp: DateTime<Utc> },
    /// The subscriber missed events and should reload state.
    Catchup {
        #[serde(rename = "eventsMissed")]
        events_missed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl CaptureEvent {
    /// Returns the event name as used for the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PendingTopicSaved { .. } => "pending_topic_saved",
            Self::PendingTopicCleared { .. } => "pending_topic_cleared",
            Self::RegistryUpdated { .. } => "registry_updated",
            Self::RegistryDeleted { .. } => "registry_deleted",
            Self::JobEnqueued { .. } => "job_enqueued",
            Self::JobUpdated { .. } => "job_updated",
            Self::IdeaSuggested { .. } => "idea_suggested",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Catchup { .. } => "catchup",
        }
    }
}

/// Publish–subscribe hub for [`CaptureEvent`]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CaptureEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: CaptureEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(count) => {
                tracing::trace!(event = name, receivers = count, "Published event");
                count
            }
            Err(_) => {
                tracing::trace!(event = name, "No subscribers for event");
                0
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
