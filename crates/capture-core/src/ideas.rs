//! Idea incubator records: engagement ledgers, cooldowns and suggestions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::ReadingMode;

/// One capture's worth of engagement signal for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEntry {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    /// Length of the selection in characters (0 = no selection).
    #[serde(default)]
    pub selection_len: usize,
    #[serde(default)]
    pub has_atomic_thought: bool,
    #[serde(default)]
    pub has_user_tags: bool,
    #[serde(default)]
    pub reading_mode: ReadingMode,
}

/// Rolling engagement ledger for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IdeaStats {
    pub entries: Vec<EngagementEntry>,
    pub display_title: String,
    pub keywords: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Suppression state for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Cooldown {
    /// Consecutive "not now" dismissals inside the escalation window.
    pub dismiss_count: u32,
    pub last_dismiss_at: Option<DateTime<Utc>>,
    /// Soft cooldown end.
    pub until: Option<DateTime<Utc>>,
    /// "Don't ask again" cooldown end.
    pub hard_until: Option<DateTime<Utc>>,
}

impl Cooldown {
    /// Returns true if either tier is still in force at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.hard_until.is_some_and(|t| t > now) || self.until.is_some_and(|t| t > now)
    }
}

/// How the user turned a suggestion down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissKind {
    /// Soft dismissal; escalates when repeated.
    NotNow,
    /// Hard dismissal.
    DontAsk,
}

impl fmt::Display for DismissKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNow => write!(f, "not_now"),
            Self::DontAsk => write!(f, "dont_ask"),
        }
    }
}

/// Lifecycle of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Open,
    Accepted,
    Dismissed,
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "accepted" => Ok(Self::Accepted),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown suggestion status: {}", other)),
        }
    }
}

/// The numbers that made a suggestion fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionReason {
    pub total_bundles: usize,
    pub deep_count: usize,
    pub engagement_score: u32,
    /// Entries whose URL was visited at least twice in the window.
    pub selection_repeat: usize,
}

/// The capture that tipped the topic over the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SuggestionContext {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub selection: String,
}

/// A proposal to start a new notebook for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSuggestion {
    pub id: Uuid,
    pub topic_key: String,
    pub display_title: String,
    pub keywords: Vec<String>,
    pub suggested_at: DateTime<Utc>,
    pub status: SuggestionStatus,
    pub reason: SuggestionReason,
    pub context: SuggestionContext,
}

/// Result of running the incubator on one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdeaEvaluation {
    pub suggestion: Option<IdeaSuggestion>,
    pub should_prompt: bool,
}

impl IdeaEvaluation {
    /// The no-op answer.
    pub fn none() -> Self {
        Self::default()
    }
}
