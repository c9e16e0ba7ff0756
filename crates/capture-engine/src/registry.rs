//! The learned topic → notebook registry and the pending-topic slot.
//!
//! The registry is one JSON list under [`keys::REGISTRY`]; the pending topic
//! is a single nullable document under [`keys::PENDING_TOPIC`]. All writes go
//! through [`DocumentStore::update`], so two contexts mutating the registry
//! at once retry instead of overwriting each other.
//!
//! Entries are never removed implicitly. Only [`Registry::delete_entry`]
//! deletes.

use std::sync::Arc;

use capture_core::{
    Clock, Destination, MatchResult, PendingTopic, RegistryEntry, RegistrySource, RegistryUpsert,
    Topic,
};
use capture_store::{DocumentStore, Mutation, keys};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::{CaptureEvent, EventBus};
use crate::scoring::{LexicalScorer, ScoringStrategy};

/// Durable registry of learned mappings plus the pending-topic slot.
#[derive(Clone)]
pub struct Registry {
    docs: DocumentStore,
    clock: Arc<dyn Clock>,
    events: EventBus,
    strategy: Arc<dyn ScoringStrategy>,
}

impl Registry {
    /// Creates a registry using the lexical scorer.
    pub fn new(docs: DocumentStore, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self::with_strategy(docs, clock, events, Arc::new(LexicalScorer))
    }

    /// Creates a registry with an explicit scoring strategy.
    pub fn with_strategy(
        docs: DocumentStore,
        clock: Arc<dyn Clock>,
        events: EventBus,
        strategy: Arc<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            docs,
            clock,
            events,
            strategy,
        }
    }

    /// The scoring strategy shared by every caller that ranks entries.
    pub fn strategy(&self) -> &Arc<dyn ScoringStrategy> {
        &self.strategy
    }

    // ------------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------------

    /// Returns every entry in insertion order.
    pub async fn list_entries(&self) -> EngineResult<Vec<RegistryEntry>> {
        Ok(self.docs.load_or_default(keys::REGISTRY).await?)
    }

    /// Returns the entry for `topic_key`, if any.
    pub async fn get_entry(&self, topic_key: &str) -> EngineResult<Option<RegistryEntry>> {
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .find(|e| e.topic_key == topic_key))
    }

    /// Ranks all entries against `topic`, best first.
    pub async fn find_matches(&self, topic: &Topic, limit: usize) -> EngineResult<Vec<MatchResult>> {
        let entries = self.list_entries().await?;
        Ok(self.strategy.rank(topic, &entries, limit, self.clock.now()))
    }

    /// Creates or refreshes the entry for `upsert.topic_key`.
    ///
    /// A new entry starts with zero uses. An existing entry keeps its usage
    /// count and creation time; blank fields in `upsert` leave the stored
    /// values alone, and a `manual` entry is never downgraded to `learned`.
    pub async fn upsert_entry(&self, upsert: RegistryUpsert) -> EngineResult<RegistryEntry> {
        if upsert.topic_key.trim().is_empty() {
            return Err(EngineError::InvalidAction("topicKey is required".to_string()));
        }
        if upsert.notebook_ref.trim().is_empty() {
            return Err(EngineError::InvalidAction(
                "notebookRef is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let entry = self
            .docs
            .update(keys::REGISTRY, |entries: &mut Vec<RegistryEntry>| {
                let entry = match entries.iter_mut().find(|e| e.topic_key == upsert.topic_key) {
                    Some(existing) => {
                        if !upsert.display_title.trim().is_empty() {
                            existing.display_title = upsert.display_title.clone();
                        }
                        if !upsert.keywords.is_empty() {
                            existing.keywords = upsert.keywords.clone();
                        }
                        existing.notebook_ref = upsert.notebook_ref.clone();
                        if !upsert.notebook_url.trim().is_empty() {
                            existing.notebook_url = upsert.notebook_url.clone();
                        }
                        if upsert.source == RegistrySource::Manual {
                            existing.source = RegistrySource::Manual;
                        }
                        existing.last_used_at = now;
                        existing.clone()
                    }
                    None => {
                        let entry = RegistryEntry {
                            topic_key: upsert.topic_key.clone(),
                            display_title: if upsert.display_title.trim().is_empty() {
                                upsert.topic_key.clone()
                            } else {
                                upsert.display_title.clone()
                            },
                            keywords: upsert.keywords.clone(),
                            notebook_ref: upsert.notebook_ref.clone(),
                            notebook_url: upsert.notebook_url.clone(),
                            usage_count: 0,
                            last_used_at: now,
                            source: upsert.source,
                            created_at: now,
                        };
                        entries.push(entry.clone());
                        entry
                    }
                };
                Mutation::Write(entry)
            })
            .await?;

        info!(
            topic_key = %entry.topic_key,
            notebook_ref = %entry.notebook_ref,
            source = ?entry.source,
            "Registry entry saved"
        );
        self.events.publish(CaptureEvent::RegistryUpdated {
            entry: entry.clone(),
        });
        Ok(entry)
    }

    /// Counts one confirmed use of `topic_key`.
    ///
    /// Returns `None` (and writes nothing) if the topic is not registered.
    pub async fn record_usage(&self, topic_key: &str) -> EngineResult<Option<RegistryEntry>> {
        let now = self.clock.now();
        let updated = self
            .docs
            .update(keys::REGISTRY, |entries: &mut Vec<RegistryEntry>| {
                match entries.iter_mut().find(|e| e.topic_key == topic_key) {
                    Some(entry) => {
                        entry.usage_count = entry.usage_count.saturating_add(1);
                        entry.last_used_at = now;
                        Mutation::Write(Some(entry.clone()))
                    }
                    None => Mutation::Discard(None),
                }
            })
            .await?;

        match &updated {
            Some(entry) => {
                debug!(topic_key, usage_count = entry.usage_count, "Recorded usage");
                self.events.publish(CaptureEvent::RegistryUpdated {
                    entry: entry.clone(),
                });
            }
            None => debug!(topic_key, "Usage for unknown topic ignored"),
        }
        Ok(updated)
    }

    /// Deletes the entry for `topic_key`. Returns true if it existed.
    pub async fn delete_entry(&self, topic_key: &str) -> EngineResult<bool> {
        let removed = self
            .docs
            .update(keys::REGISTRY, |entries: &mut Vec<RegistryEntry>| {
                let before = entries.len();
                entries.retain(|e| e.topic_key != topic_key);
                if entries.len() == before {
                    Mutation::Discard(false)
                } else {
                    Mutation::Write(true)
                }
            })
            .await?;

        if removed {
            info!(topic_key, "Registry entry deleted");
            self.events.publish(CaptureEvent::RegistryDeleted {
                topic_key: topic_key.to_string(),
            });
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Pending topic
    // ------------------------------------------------------------------------

    /// Returns the pending topic, if one is staged.
    pub async fn get_pending_topic(&self) -> EngineResult<Option<PendingTopic>> {
        Ok(self
            .docs
            .load_or_default::<Option<PendingTopic>>(keys::PENDING_TOPIC)
            .await?)
    }

    /// Stages `pending`, replacing whatever was staged before.
    pub async fn set_pending_topic(&self, pending: PendingTopic) -> EngineResult<()> {
        self.docs.save(keys::PENDING_TOPIC, &Some(&pending)).await?;
        debug!(topic_key = %pending.topic_key, "Pending topic staged");
        self.events
            .publish(CaptureEvent::PendingTopicSaved { pending });
        Ok(())
    }

    /// Empties the pending slot. Returns what was staged.
    pub async fn clear_pending_topic(&self) -> EngineResult<Option<PendingTopic>> {
        let cleared = self
            .docs
            .update(keys::PENDING_TOPIC, |slot: &mut Option<PendingTopic>| {
                match slot.take() {
                    Some(p) => Mutation::Write(Some(p)),
                    None => Mutation::Discard(None),
                }
            })
            .await?;

        if let Some(p) = &cleared {
            debug!(topic_key = %p.topic_key, "Pending topic cleared");
            self.events.publish(CaptureEvent::PendingTopicCleared {
                topic_key: Some(p.topic_key.clone()),
            });
        }
        Ok(cleared)
    }

    /// Turns the pending topic into a registry entry pointing at
    /// `destination`.
    ///
    /// Returns `None` if nothing is pending. The slot is only cleared if it
    /// still holds the topic that was completed; a newer pending topic
    /// staged in the meantime survives.
    pub async fn complete_pending_topic(
        &self,
        destination: Destination,
        source: RegistrySource,
    ) -> EngineResult<Option<RegistryEntry>> {
        let Some(pending) = self.get_pending_topic().await? else {
            return Ok(None);
        };

        let entry = self
            .upsert_entry(RegistryUpsert {
                topic_key: pending.topic_key.clone(),
                display_title: destination
                    .display_title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| pending.display_title.clone()),
                keywords: if destination.keywords.is_empty() {
                    pending.keywords.clone()
                } else {
                    destination.keywords
                },
                notebook_ref: destination.notebook_ref,
                notebook_url: destination.notebook_url,
                source,
            })
            .await?;

        let cleared = self
            .docs
            .update(keys::PENDING_TOPIC, |slot: &mut Option<PendingTopic>| {
                let same = slot.as_ref().is_some_and(|p| {
                    p.topic_key == pending.topic_key && p.created_at == pending.created_at
                });
                if same {
                    *slot = None;
                    Mutation::Write(true)
                } else {
                    Mutation::Discard(false)
                }
            })
            .await?;

        info!(
            topic_key = %entry.topic_key,
            notebook_ref = %entry.notebook_ref,
            source = ?source,
            "Pending topic completed"
        );
        if cleared {
            self.events.publish(CaptureEvent::PendingTopicCleared {
                topic_key: Some(entry.topic_key.clone()),
            });
        }
        Ok(Some(entry))
    }

    /// Passive learning: an export to `notebook_ref` was observed without
    /// an explicit `save`. Completes the pending topic as a learned entry.
    pub async fn observe_destination(
        &self,
        notebook_ref: &str,
        notebook_url: &str,
    ) -> EngineResult<Option<RegistryEntry>> {
        if notebook_ref.trim().is_empty() {
            return Err(EngineError::InvalidAction(
                "notebookRef is required".to_string(),
            ));
        }
        self.complete_pending_topic(
            Destination {
                notebook_ref: notebook_ref.to_string(),
                notebook_url: notebook_url.to_string(),
                ..Default::default()
            },
            RegistrySource::Learned,
        )
        .await
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
