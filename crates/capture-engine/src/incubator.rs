//! Idea incubation: noticing when a topic deserves its own notebook.
//!
//! Every capture adds an engagement entry to the topic's rolling 7-day
//! ledger. Once a topic has been captured often enough, and read deeply
//! or engaged with enough, the incubator proposes a new notebook for it.
//!
//! ## Gates
//!
//! A suggestion fires when `totalBundles >= 5` and either
//! `deepCount >= 2` or `engagementScore >= 8`. The bundle count is a hard
//! floor: four heavily engaged captures never fire.
//!
//! ## Cooldowns
//!
//! Dismissals suppress a topic for a while. "Not now" starts at 7 days and
//! escalates to 30 when repeated within 30 days of the previous dismissal.
//! "Don't ask" suppresses for 90 days on a separate tier that only
//! [`IdeaIncubator::reset_cooldown`] lifts early. While suppressed, or while
//! a suggestion for the topic is still open, captures are not recorded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use capture_core::{
    CaptureContext, Clock, Cooldown, DismissKind, EngagementEntry, IdeaEvaluation, IdeaStats,
    IdeaSuggestion, SuggestionContext, SuggestionReason, SuggestionStatus, Topic,
};
use capture_store::{DocumentStore, Mutation, keys};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::events::{CaptureEvent, EventBus};
use crate::extract::{TopicExtractor, capture_host};

/// Minimum captures in the window before a topic can fire.
pub const MIN_BUNDLES: usize = 5;

/// Deep reads that satisfy the engagement gate on their own.
pub const MIN_DEEP_COUNT: usize = 2;

/// Engagement score that satisfies the engagement gate on its own.
pub const MIN_ENGAGEMENT_SCORE: u32 = 8;

/// Visits of the same URL that count as a reread.
pub const REPEAT_URL_VISITS: usize = 2;

const SELECTION_WEIGHT: u32 = 2;
const ATOMIC_THOUGHT_WEIGHT: u32 = 2;
const USER_TAGS_WEIGHT: u32 = 1;
const REPEAT_URL_WEIGHT: u32 = 1;

/// Characters of the selection kept on a suggestion.
const MAX_CONTEXT_SELECTION: usize = 280;

/// Closed suggestions kept for history; open ones are never dropped.
const MAX_CLOSED_SUGGESTIONS: usize = 200;

/// Rolling ledger window.
pub fn ledger_window() -> Duration {
    Duration::days(7)
}

/// A second "not now" inside this window escalates the cooldown.
pub fn escalation_window() -> Duration {
    Duration::days(30)
}

/// First "not now" cooldown.
pub fn soft_cooldown() -> Duration {
    Duration::days(7)
}

/// Repeated "not now" cooldown.
pub fn escalated_cooldown() -> Duration {
    Duration::days(30)
}

/// "Don't ask" cooldown.
pub fn hard_cooldown() -> Duration {
    Duration::days(90)
}

type StatsDoc = BTreeMap<String, IdeaStats>;
type CooldownDoc = BTreeMap<String, Cooldown>;

/// Per-topic engagement ledgers, cooldowns and suggestions.
#[derive(Clone)]
pub struct IdeaIncubator {
    docs: DocumentStore,
    clock: Arc<dyn Clock>,
    extractor: TopicExtractor,
    events: EventBus,
}

impl IdeaIncubator {
    pub fn new(
        docs: DocumentStore,
        clock: Arc<dyn Clock>,
        extractor: TopicExtractor,
        events: EventBus,
    ) -> Self {
        Self {
            docs,
            clock,
            extractor,
            events,
        }
    }

    /// Records one capture and returns a suggestion if the topic just
    /// crossed the threshold.
    pub async fn evaluate(&self, context: &CaptureContext) -> EngineResult<IdeaEvaluation> {
        let topic = self.extractor.extract(context);
        self.evaluate_topic(&topic, context).await
    }

    /// Like [`evaluate`](Self::evaluate) for an already extracted topic.
    pub async fn evaluate_topic(
        &self,
        topic: &Topic,
        context: &CaptureContext,
    ) -> EngineResult<IdeaEvaluation> {
        let now = self.clock.now();

        if self.get_cooldown(&topic.topic_key).await?.is_active(now) {
            debug!(topic_key = %topic.topic_key, "Topic in cooldown, not recording");
            return Ok(IdeaEvaluation::none());
        }
        if self.open_suggestion(&topic.topic_key).await?.is_some() {
            debug!(topic_key = %topic.topic_key, "Suggestion already open, not recording");
            return Ok(IdeaEvaluation::none());
        }

        let entry = engagement_entry(context, now);
        let window_start = now - ledger_window();
        let reason = self
            .docs
            .update(keys::IDEA_STATS, |stats: &mut StatsDoc| {
                let ledger = stats.entry(topic.topic_key.clone()).or_default();
                ledger.entries.retain(|e| e.at >= window_start);
                ledger.entries.push(entry.clone());
                ledger.display_title = topic.display_title.clone();
                ledger.keywords = topic.keywords.clone();
                ledger.updated_at = Some(now);
                Mutation::Write(assess(&ledger.entries))
            })
            .await?;

        debug!(
            topic_key = %topic.topic_key,
            bundles = reason.total_bundles,
            deep = reason.deep_count,
            score = reason.engagement_score,
            "Recorded engagement"
        );

        if !should_suggest(&reason) {
            return Ok(IdeaEvaluation::none());
        }

        let suggestion = IdeaSuggestion {
            id: Uuid::new_v4(),
            topic_key: topic.topic_key.clone(),
            display_title: topic.display_title.clone(),
            keywords: topic.keywords.clone(),
            suggested_at: now,
            status: SuggestionStatus::Open,
            reason,
            context: suggestion_context(context),
        };

        let stored = self
            .docs
            .update(keys::IDEA_SUGGESTIONS, |list: &mut Vec<IdeaSuggestion>| {
                if list
                    .iter()
                    .any(|s| s.topic_key == suggestion.topic_key && s.status == SuggestionStatus::Open)
                {
                    return Mutation::Discard(false);
                }
                list.push(suggestion.clone());
                trim_closed(list);
                Mutation::Write(true)
            })
            .await?;

        if !stored {
            // Another context raised the same suggestion first
            return Ok(IdeaEvaluation::none());
        }

        // The suggestion consumes the engagement that earned it
        self.docs
            .update(keys::IDEA_STATS, |stats: &mut StatsDoc| {
                match stats.get_mut(&suggestion.topic_key) {
                    Some(ledger) if !ledger.entries.is_empty() => {
                        ledger.entries.clear();
                        ledger.updated_at = Some(now);
                        Mutation::Write(())
                    }
                    _ => Mutation::Discard(()),
                }
            })
            .await?;

        info!(
            topic_key = %suggestion.topic_key,
            bundles = suggestion.reason.total_bundles,
            "Suggesting a new notebook"
        );
        self.events.publish(CaptureEvent::IdeaSuggested {
            suggestion: suggestion.clone(),
        });
        Ok(IdeaEvaluation {
            suggestion: Some(suggestion),
            should_prompt: true,
        })
    }

    /// Records a dismissal and returns the resulting cooldown.
    ///
    /// Open suggestions for the topic are marked dismissed.
    pub async fn record_idea_dismiss(
        &self,
        topic_key: &str,
        kind: DismissKind,
    ) -> EngineResult<Cooldown> {
        let now = self.clock.now();
        let cooldown = self
            .docs
            .update(keys::IDEA_COOLDOWNS, |map: &mut CooldownDoc| {
                let cooldown = map.entry(topic_key.to_string()).or_default();
                apply_dismiss(cooldown, kind, now);
                Mutation::Write(cooldown.clone())
            })
            .await?;

        let closed = self
            .docs
            .update(keys::IDEA_SUGGESTIONS, |list: &mut Vec<IdeaSuggestion>| {
                let mut closed = 0;
                for s in list
                    .iter_mut()
                    .filter(|s| s.topic_key == topic_key && s.status == SuggestionStatus::Open)
                {
                    s.status = SuggestionStatus::Dismissed;
                    closed += 1;
                }
                match closed {
                    0 => Mutation::Discard(0),
                    n => Mutation::Write(n),
                }
            })
            .await?;

        info!(
            topic_key,
            kind = %kind,
            dismiss_count = cooldown.dismiss_count,
            closed,
            "Suggestion dismissed"
        );
        Ok(cooldown)
    }

    /// The cooldown for a topic (default when none was ever recorded).
    pub async fn get_cooldown(&self, topic_key: &str) -> EngineResult<Cooldown> {
        let map: CooldownDoc = self.docs.load_or_default(keys::IDEA_COOLDOWNS).await?;
        Ok(map.get(topic_key).cloned().unwrap_or_default())
    }

    pub async fn is_cooldown_active(&self, topic_key: &str) -> EngineResult<bool> {
        Ok(self.get_cooldown(topic_key).await?.is_active(self.clock.now()))
    }

    /// Lifts the "don't ask" tier. Returns true if one was set.
    pub async fn reset_cooldown(&self, topic_key: &str) -> EngineResult<bool> {
        let lifted = self
            .docs
            .update(keys::IDEA_COOLDOWNS, |map: &mut CooldownDoc| {
                match map.get_mut(topic_key) {
                    Some(c) if c.hard_until.is_some() => {
                        c.hard_until = None;
                        Mutation::Write(true)
                    }
                    _ => Mutation::Discard(false),
                }
            })
            .await?;
        if lifted {
            info!(topic_key, "Cooldown reset");
        }
        Ok(lifted)
    }

    /// Suggestions in creation order, optionally filtered by status.
    pub async fn list_suggestions(
        &self,
        status: Option<SuggestionStatus>,
    ) -> EngineResult<Vec<IdeaSuggestion>> {
        let list: Vec<IdeaSuggestion> = self.docs.load_or_default(keys::IDEA_SUGGESTIONS).await?;
        Ok(list
            .into_iter()
            .filter(|s| status.is_none_or(|st| s.status == st))
            .collect())
    }

    /// Sets a suggestion's status. Returns the updated suggestion.
    pub async fn update_idea_suggestion_status(
        &self,
        id: Uuid,
        status: SuggestionStatus,
    ) -> EngineResult<Option<IdeaSuggestion>> {
        let updated = self
            .docs
            .update(keys::IDEA_SUGGESTIONS, |list: &mut Vec<IdeaSuggestion>| {
                match list.iter_mut().find(|s| s.id == id) {
                    Some(s) => {
                        s.status = status;
                        Mutation::Write(Some(s.clone()))
                    }
                    None => Mutation::Discard(None),
                }
            })
            .await?;
        if let Some(s) = &updated {
            debug!(id = %s.id, topic_key = %s.topic_key, ?status, "Suggestion status updated");
        }
        Ok(updated)
    }

    /// The engagement ledger of a topic.
    pub async fn get_stats(&self, topic_key: &str) -> EngineResult<Option<IdeaStats>> {
        let stats: StatsDoc = self.docs.load_or_default(keys::IDEA_STATS).await?;
        Ok(stats.get(topic_key).cloned())
    }

    async fn open_suggestion(&self, topic_key: &str) -> EngineResult<Option<IdeaSuggestion>> {
        Ok(self
            .list_suggestions(Some(SuggestionStatus::Open))
            .await?
            .into_iter()
            .find(|s| s.topic_key == topic_key))
    }
}

impl std::fmt::Debug for IdeaIncubator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdeaIncubator")
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

/// Computes the gate numbers for a ledger.
pub fn assess(entries: &[EngagementEntry]) -> SuggestionReason {
    let mut visits: HashMap<&str, usize> = HashMap::new();
    for e in entries.iter().filter(|e| !e.url.is_empty()) {
        *visits.entry(e.url.as_str()).or_default() += 1;
    }

    let mut reason = SuggestionReason {
        total_bundles: entries.len(),
        ..Default::default()
    };
    for e in entries {
        let repeated = visits
            .get(e.url.as_str())
            .is_some_and(|&n| !e.url.is_empty() && n >= REPEAT_URL_VISITS);

        if e.selection_len > 0 {
            reason.engagement_score += SELECTION_WEIGHT;
        }
        if e.has_atomic_thought {
            reason.engagement_score += ATOMIC_THOUGHT_WEIGHT;
        }
        if e.has_user_tags {
            reason.engagement_score += USER_TAGS_WEIGHT;
        }
        if repeated {
            reason.engagement_score += REPEAT_URL_WEIGHT;
            reason.selection_repeat += 1;
        }
        if e.reading_mode.is_deep() || repeated {
            reason.deep_count += 1;
        }
    }
    reason
}

/// True when the gate numbers warrant a suggestion.
pub fn should_suggest(reason: &SuggestionReason) -> bool {
    reason.total_bundles >= MIN_BUNDLES
        && (reason.deep_count >= MIN_DEEP_COUNT || reason.engagement_score >= MIN_ENGAGEMENT_SCORE)
}

fn apply_dismiss(cooldown: &mut Cooldown, kind: DismissKind, now: DateTime<Utc>) {
    match kind {
        DismissKind::NotNow => {
            let recent = cooldown
                .last_dismiss_at
                .is_some_and(|last| now - last <= escalation_window());
            cooldown.dismiss_count = if recent {
                cooldown.dismiss_count.saturating_add(1)
            } else {
                1
            };
            let span = if cooldown.dismiss_count >= 2 {
                escalated_cooldown()
            } else {
                soft_cooldown()
            };
            cooldown.until = Some(now + span);
        }
        DismissKind::DontAsk => {
            cooldown.hard_until = Some(now + hard_cooldown());
            cooldown.dismiss_count = 0;
        }
    }
    cooldown.last_dismiss_at = Some(now);
}

fn engagement_entry(context: &CaptureContext, now: DateTime<Utc>) -> EngagementEntry {
    EngagementEntry {
        at: now,
        url: context.url.trim().to_string(),
        selection_len: context.selected_text.trim().chars().count(),
        has_atomic_thought: context.has_atomic_thought(),
        has_user_tags: context.tags.iter().any(|t| !t.trim().is_empty()),
        reading_mode: context.reading_mode.unwrap_or_default(),
    }
}

fn suggestion_context(context: &CaptureContext) -> SuggestionContext {
    SuggestionContext {
        url: context.url.clone(),
        title: context.title.clone(),
        domain: capture_host(context).unwrap_or_default(),
        selection: context
            .selected_text
            .trim()
            .chars()
            .take(MAX_CONTEXT_SELECTION)
            .collect(),
    }
}

fn trim_closed(list: &mut Vec<IdeaSuggestion>) {
    let closed = list
        .iter()
        .filter(|s| s.status != SuggestionStatus::Open)
        .count();
    let mut excess = closed.saturating_sub(MAX_CLOSED_SUGGESTIONS);
    list.retain(|s| {
        if excess > 0 && s.status != SuggestionStatus::Open {
            excess -= 1;
            false
        } else {
            true
        }
    });
}
