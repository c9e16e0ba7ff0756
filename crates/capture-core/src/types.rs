//! Core data types for the capture router.
//!
//! This module defines the records that flow between the extractor, the
//! registry, the router and the action handlers:
//!
//! - A [`CaptureContext`] is what the reading surface hands us
//! - A [`Topic`] is the canonical identity extracted from a capture
//! - A [`RegistryEntry`] is a learned topic → notebook mapping
//! - A [`PendingTopic`] is the single topic waiting for a destination
//! - A [`RouterResult`] is the routing decision handed back to the caller
//! - A [`RouteAction`] is the user's answer to that decision
//!
//! All durable types derive `Serialize` and `Deserialize` and are stored as
//! camelCase JSON documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Capture Payload
// ============================================================================

/// Proxy for how attentively the page was being read when captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingMode {
    /// Quick scan of the page.
    Skim,
    /// Ordinary reading.
    #[default]
    Normal,
    /// Sustained, focused reading.
    Deep,
    /// The reader came back to material they had already read.
    Reread,
}

impl ReadingMode {
    /// Returns true for the modes that count as deep engagement.
    pub fn is_deep(self) -> bool {
        matches!(self, Self::Deep | Self::Reread)
    }
}

/// A captured reading fragment: the highlighted passage plus page metadata.
///
/// Every field is optional on the wire; a completely empty capture still
/// extracts to a (low-confidence) keyword topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureContext {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// Page domain (derived from `url` when empty).
    pub domain: String,
    /// The highlighted passage.
    #[serde(alias = "selection")]
    pub selected_text: String,
    /// User-confirmed tags.
    pub tags: Vec<String>,
    /// Free-form capture intent ("save", "question", ...).
    pub intent: Option<String>,
    /// When the fragment was captured.
    pub captured_at: Option<DateTime<Utc>>,
    /// The user's own one-line takeaway, if they wrote one.
    pub atomic_thought: Option<String>,
    /// Reading-mode proxy reported by the reading surface.
    pub reading_mode: Option<ReadingMode>,
}

impl CaptureContext {
    /// Returns true if the capture carries a non-blank selection.
    pub fn has_selection(&self) -> bool {
        !self.selected_text.trim().is_empty()
    }

    /// Returns true if the user attached a non-blank atomic thought.
    pub fn has_atomic_thought(&self) -> bool {
        self.atomic_thought
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

// ============================================================================
// Topic
// ============================================================================

/// Which tier of the extractor produced a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSource {
    /// A user-confirmed tag.
    Tag,
    /// The registrable domain of a non-aggregator site.
    Domain,
    /// A fingerprint of the capture's content words.
    Keyword,
}

impl TopicSource {
    /// Returns the `topicKey` prefix for this tier.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Tag => "tag:",
            Self::Domain => "dom:",
            Self::Keyword => "kw:",
        }
    }
}

impl fmt::Display for TopicSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag => write!(f, "tag"),
            Self::Domain => write!(f, "domain"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

/// The canonical subject of a capture.
///
/// `topic_key` is a pure function of the capture content; `display_title`
/// is only a label and may be replaced without changing identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Canonical, deterministic identifier (`tag:`, `dom:` or `kw:` prefixed).
    pub topic_key: String,
    /// Tier that produced the key.
    pub topic_source: TopicSource,
    /// Human-readable label.
    pub display_title: String,
    /// Content keywords, lowercase, most significant first.
    pub keywords: Vec<String>,
    /// Extraction confidence in `[0, 1]`, decreasing tier by tier.
    pub confidence: f64,
}

// ============================================================================
// Registry
// ============================================================================

/// How a registry entry came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    /// Learned passively from an observed export.
    #[default]
    Learned,
    /// Confirmed explicitly by the user.
    Manual,
}

/// A learned mapping from a topic to a destination notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Topic identity this entry routes.
    pub topic_key: String,
    /// Label shown for the destination.
    pub display_title: String,
    /// Keywords used for fuzzy matching.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Opaque reference to the destination notebook.
    pub notebook_ref: String,
    /// URL of the destination notebook.
    #[serde(default)]
    pub notebook_url: String,
    /// Number of confirmed uses.
    #[serde(default)]
    pub usage_count: u64,
    /// Last confirmed use.
    pub last_used_at: DateTime<Utc>,
    /// How the entry was created.
    #[serde(default)]
    pub source: RegistrySource,
    /// When the entry was first created.
    pub created_at: DateTime<Utc>,
}

/// Fields for creating or refreshing a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryUpsert {
    pub topic_key: String,
    pub display_title: String,
    pub keywords: Vec<String>,
    pub notebook_ref: String,
    pub notebook_url: String,
    pub source: RegistrySource,
}

/// Where a pending topic is finally mapped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Destination {
    pub notebook_ref: String,
    pub notebook_url: String,
    /// Overrides the pending topic's title when set.
    pub display_title: Option<String>,
    /// Overrides the pending topic's keywords when non-empty.
    pub keywords: Vec<String>,
}

/// The one topic awaiting a user-confirmed notebook mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTopic {
    pub topic_key: String,
    pub topic_source: TopicSource,
    pub display_title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub confidence: f64,
    /// The capture that produced this topic.
    #[serde(default)]
    pub context: CaptureContext,
    pub created_at: DateTime<Utc>,
}

impl PendingTopic {
    /// Builds a pending topic from an extracted topic and its capture.
    pub fn from_topic(topic: &Topic, context: &CaptureContext, now: DateTime<Utc>) -> Self {
        Self {
            topic_key: topic.topic_key.clone(),
            topic_source: topic.topic_source,
            display_title: topic.display_title.clone(),
            keywords: topic.keywords.clone(),
            confidence: topic.confidence,
            context: context.clone(),
            created_at: now,
        }
    }
}

// ============================================================================
// Scoring and Routing
// ============================================================================

/// One contribution to a match score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchReason {
    /// The topic keys are identical.
    ExactKey { weight: f64 },
    /// Keywords matched exactly and/or by containment.
    KeywordOverlap {
        exact: usize,
        partial: usize,
        weight: f64,
    },
    /// The titles are similar enough to count.
    TitleSimilarity { similarity: f64, weight: f64 },
    /// The entry is used often.
    Usage {
        #[serde(rename = "usageCount")]
        usage_count: u64,
        weight: f64,
    },
    /// The entry was used recently.
    Recency { days: i64, weight: f64 },
}

impl MatchReason {
    /// Returns the weight this reason added to the score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::ExactKey { weight }
            | Self::KeywordOverlap { weight, .. }
            | Self::TitleSimilarity { weight, .. }
            | Self::Usage { weight, .. }
            | Self::Recency { weight, .. } => *weight,
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactKey { .. } => write!(f, "exact topic key"),
            Self::KeywordOverlap { exact, partial, .. } => {
                write!(f, "keywords: {} exact, {} partial", exact, partial)
            }
            Self::TitleSimilarity { similarity, .. } => {
                write!(f, "title similarity {:.2}", similarity)
            }
            Self::Usage { usage_count, .. } => write!(f, "used {} times", usage_count),
            Self::Recency { days, .. } => write!(f, "used {} days ago", days),
        }
    }
}

/// The score of one registry entry against one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub entry: RegistryEntry,
    /// Score in `[0, 1]`.
    pub score: f64,
    pub reasons: Vec<MatchReason>,
}

/// What the router recommends doing with a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// Route to the best match without asking.
    UseExisting,
    /// Show the best match and alternatives, let the user confirm.
    Ask,
    /// Propose a brand-new notebook.
    Create,
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseExisting => write!(f, "use_existing"),
            Self::Ask => write!(f, "ask"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A scored candidate destination, flattened for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMatch {
    pub notebook_ref: String,
    pub notebook_url: String,
    pub score: f64,
    pub display_title: String,
    pub topic_key: String,
    pub reasons: Vec<MatchReason>,
}

impl From<MatchResult> for BestMatch {
    fn from(m: MatchResult) -> Self {
        Self {
            notebook_ref: m.entry.notebook_ref,
            notebook_url: m.entry.notebook_url,
            score: m.score,
            display_title: m.entry.display_title,
            topic_key: m.entry.topic_key,
            reasons: m.reasons,
        }
    }
}

/// The router's answer for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterResult {
    pub decision: RouteDecision,
    pub best_match: Option<BestMatch>,
    pub alternatives: Vec<BestMatch>,
    pub topic_key: String,
    pub topic_source: TopicSource,
    /// The extractor's own label.
    pub topic_label: String,
    /// The label to show, possibly supplied by a title provider.
    pub display_title: String,
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub reason: String,
}

/// Options for a routing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteOptions {
    /// Persist a pending topic when the user still has to decide.
    pub save_pending: bool,
    /// How many runners-up to return after the best match.
    pub max_alternatives: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            save_pending: true,
            max_alternatives: 3,
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Payload shared by every routing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionData {
    pub topic_key: Option<String>,
    pub display_title: Option<String>,
    pub keywords: Vec<String>,
    pub notebook_ref: Option<String>,
    pub notebook_url: Option<String>,
    pub selection: Option<String>,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub source_domain: Option<String>,
}

/// The user's answer to a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum RouteAction {
    /// Route to an existing mapping and count the use.
    #[serde(alias = "use_existing")]
    Use(ActionData),
    /// Navigate to a notebook; no registry mutation.
    Open(ActionData),
    /// Stage a new notebook proposal as the pending topic.
    Create(ActionData),
    /// Confirm a mapping into the registry.
    Save(ActionData),
    /// Drop the pending topic.
    Skip(ActionData),
}

impl RouteAction {
    /// Returns the action name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Use(_) => "use",
            Self::Open(_) => "open",
            Self::Create(_) => "create",
            Self::Save(_) => "save",
            Self::Skip(_) => "skip",
        }
    }
}

impl FromStr for RouteDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_existing" => Ok(Self::UseExisting),
            "ask" => Ok(Self::Ask),
            "create" => Ok(Self::Create),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// What an action did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Usage was recorded; `entry` is `None` if the topic was unknown.
    UsageRecorded { entry: Option<RegistryEntry> },
    /// Navigation target resolved.
    Opened {
        #[serde(rename = "notebookUrl")]
        notebook_url: Option<String>,
    },
    /// Pending topic staged for later confirmation.
    PendingStaged { pending: PendingTopic },
    /// Mapping written to the registry.
    Saved {
        entry: RegistryEntry,
        #[serde(rename = "completedPending")]
        completed_pending: bool,
    },
    /// Pending topic discarded.
    Skipped { cleared: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_context_accepts_selection_alias() {
        let json = r#"{"title":"T","selection":"picked text","tags":["rust"]}"#;
        let ctx: CaptureContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.selected_text, "picked text");
        assert!(ctx.has_selection());
        assert_eq!(ctx.tags, vec!["rust"]);
    }

    #[test]
    fn atomic_thought_must_be_non_blank() {
        let mut ctx = CaptureContext::default();
        assert!(!ctx.has_atomic_thought());
        ctx.atomic_thought = Some("   ".to_string());
        assert!(!ctx.has_atomic_thought());
        ctx.atomic_thought = Some("ownership moves".to_string());
        assert!(ctx.has_atomic_thought());
    }

    #[test]
    fn route_action_wire_format() {
        let json = r#"{"action":"use_existing","data":{"topicKey":"tag:rust"}}"#;
        let action: RouteAction = serde_json::from_str(json).unwrap();
        match action {
            RouteAction::Use(data) => assert_eq!(data.topic_key.as_deref(), Some("tag:rust")),
            other => panic!("expected use, got {:?}", other),
        }

        let skip: RouteAction = serde_json::from_str(r#"{"action":"skip","data":{}}"#).unwrap();
        assert_eq!(skip.name(), "skip");
    }

    #[test]
    fn decision_serializes_snake_case() {
        let json = serde_json::to_string(&RouteDecision::UseExisting).unwrap();
        assert_eq!(json, "\"use_existing\"");
        assert_eq!("ask".parse::<RouteDecision>().unwrap(), RouteDecision::Ask);
    }

    #[test]
    fn reading_mode_deep_variants() {
        assert!(ReadingMode::Deep.is_deep());
        assert!(ReadingMode::Reread.is_deep());
        assert!(!ReadingMode::Skim.is_deep());
        assert!(!ReadingMode::Normal.is_deep());
    }

    #[test]
    fn match_reason_weight() {
        let reason = MatchReason::KeywordOverlap {
            exact: 2,
            partial: 1,
            weight: 0.6,
        };
        assert_eq!(reason.weight(), 0.6);
        assert_eq!(reason.to_string(), "keywords: 2 exact, 1 partial");
    }
}
