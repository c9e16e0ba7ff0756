//! The routing action state machine.
//!
//! | Action | Registry | Pending topic |
//! |--------|----------|---------------|
//! | `use` | usage +1 | cleared |
//! | `open` | untouched | untouched |
//! | `create` | untouched | staged or refreshed |
//! | `save` | upserted (completes pending if it matches) | cleared on completion |
//! | `skip` | untouched | cleared |

use capture_core::{
    ActionData, ActionOutcome, CaptureContext, Destination, PendingTopic, RegistrySource,
    RegistryUpsert, RouteAction, TopicSource,
};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::extract::{DOMAIN_CONFIDENCE, TAG_CONFIDENCE};
use crate::router::Router;

/// Confidence given to a keyword topic staged directly by a `create`.
const STAGED_KEYWORD_CONFIDENCE: f64 = 0.3;

impl Router {
    /// Applies one user action.
    pub async fn handle_action(&self, action: RouteAction) -> EngineResult<ActionOutcome> {
        let name = action.name();
        let outcome = match action {
            RouteAction::Use(data) => self.use_existing(data).await?,
            RouteAction::Open(data) => self.open(data).await?,
            RouteAction::Create(data) => self.create(data).await?,
            RouteAction::Save(data) => self.save(data).await?,
            RouteAction::Skip(_) => ActionOutcome::Skipped {
                cleared: self.registry.clear_pending_topic().await?.is_some(),
            },
        };
        info!(action = name, "Handled routing action");
        Ok(outcome)
    }

    async fn use_existing(&self, data: ActionData) -> EngineResult<ActionOutcome> {
        let topic_key = required(data.topic_key, "topicKey")?;
        let entry = self.registry.record_usage(&topic_key).await?;
        self.registry.clear_pending_topic().await?;
        Ok(ActionOutcome::UsageRecorded { entry })
    }

    async fn open(&self, data: ActionData) -> EngineResult<ActionOutcome> {
        if let Some(url) = non_blank(data.notebook_url) {
            return Ok(ActionOutcome::Opened {
                notebook_url: Some(url),
            });
        }
        let notebook_url = match non_blank(data.topic_key) {
            Some(key) => self
                .registry
                .get_entry(&key)
                .await?
                .map(|e| e.notebook_url)
                .filter(|u| !u.is_empty()),
            None => None,
        };
        Ok(ActionOutcome::Opened { notebook_url })
    }

    async fn create(&self, data: ActionData) -> EngineResult<ActionOutcome> {
        let existing = self.registry.get_pending_topic().await?;
        let topic_key = non_blank(data.topic_key.clone());

        let pending = match existing {
            Some(mut pending) if topic_key.as_ref().is_none_or(|k| *k == pending.topic_key) => {
                if let Some(title) = non_blank(data.display_title) {
                    pending.display_title = title;
                }
                if !data.keywords.is_empty() {
                    pending.keywords = data.keywords;
                }
                pending
            }
            _ => {
                let topic_key = topic_key.ok_or_else(|| {
                    EngineError::InvalidAction(
                        "create needs a topicKey when nothing is pending".to_string(),
                    )
                })?;
                let topic_source = source_of_key(&topic_key);
                let context = CaptureContext {
                    title: data.source_title.clone().unwrap_or_default(),
                    url: data.source_url.clone().unwrap_or_default(),
                    domain: data.source_domain.clone().unwrap_or_default(),
                    selected_text: data.selection.clone().unwrap_or_default(),
                    ..Default::default()
                };
                PendingTopic {
                    display_title: non_blank(data.display_title)
                        .or_else(|| non_blank(data.source_title))
                        .unwrap_or_else(|| topic_key.clone()),
                    topic_key,
                    topic_source,
                    keywords: data.keywords,
                    confidence: match topic_source {
                        TopicSource::Tag => TAG_CONFIDENCE,
                        TopicSource::Domain => DOMAIN_CONFIDENCE,
                        TopicSource::Keyword => STAGED_KEYWORD_CONFIDENCE,
                    },
                    context,
                    created_at: self.clock.now(),
                }
            }
        };

        self.registry.set_pending_topic(pending.clone()).await?;
        Ok(ActionOutcome::PendingStaged { pending })
    }

    async fn save(&self, data: ActionData) -> EngineResult<ActionOutcome> {
        let notebook_ref = required(data.notebook_ref, "notebookRef")?;
        let topic_key = non_blank(data.topic_key);
        let notebook_url = data.notebook_url.unwrap_or_default();

        let pending = self.registry.get_pending_topic().await?;
        let completes_pending = pending
            .as_ref()
            .is_some_and(|p| topic_key.as_ref().is_none_or(|k| *k == p.topic_key));

        if completes_pending {
            let completed = self
                .registry
                .complete_pending_topic(
                    Destination {
                        notebook_ref: notebook_ref.clone(),
                        notebook_url: notebook_url.clone(),
                        display_title: non_blank(data.display_title.clone()),
                        keywords: data.keywords.clone(),
                    },
                    RegistrySource::Manual,
                )
                .await?;
            if let Some(entry) = completed {
                return Ok(ActionOutcome::Saved {
                    entry,
                    completed_pending: true,
                });
            }
            // The slot was emptied between the read and the completion
        }

        let topic_key = topic_key.ok_or_else(|| {
            EngineError::InvalidAction("save needs a topicKey when nothing is pending".to_string())
        })?;
        let entry = self
            .registry
            .upsert_entry(RegistryUpsert {
                topic_key,
                display_title: data.display_title.unwrap_or_default(),
                keywords: data.keywords,
                notebook_ref,
                notebook_url,
                source: RegistrySource::Manual,
            })
            .await?;
        Ok(ActionOutcome::Saved {
            entry,
            completed_pending: false,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str) -> EngineResult<String> {
    non_blank(value).ok_or_else(|| EngineError::InvalidAction(format!("{} is required", field)))
}

/// Infers the extractor tier from a topic key prefix.
fn source_of_key(topic_key: &str) -> TopicSource {
    [TopicSource::Tag, TopicSource::Domain]
        .into_iter()
        .find(|s| topic_key.starts_with(s.key_prefix()))
        .unwrap_or(TopicSource::Keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::extract::TopicExtractor;
    use crate::registry::Registry;
    use capture_core::{Clock, FixedClock, RouteOptions};
    use capture_store::{DocumentStore, MemoryStore};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn router() -> Router {
        let clock: Arc<dyn Clock> =
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let registry = Registry::new(
            DocumentStore::new(Arc::new(MemoryStore::new())),
            clock.clone(),
            EventBus::new(),
        );
        Router::new(registry, TopicExtractor::default(), clock)
    }

    fn data() -> ActionData {
        ActionData::default()
    }

    async fn route_something(router: &Router) -> String {
        let ctx = CaptureContext {
            title: "Intro to Rust".to_string(),
            selected_text: "ownership and borrowing".to_string(),
            domain: "youtube.com".to_string(),
            ..Default::default()
        };
        router
            .route_topic(&ctx, RouteOptions::default())
            .await
            .unwrap()
            .topic_key
    }

    #[tokio::test]
    async fn test_save_completes_pending() {
        let router = router();
        let key = route_something(&router).await;

        let outcome = router
            .handle_action(RouteAction::Save(ActionData {
                notebook_ref: Some("nb-1".to_string()),
                notebook_url: Some("https://notebooks.test/nb-1".to_string()),
                ..data()
            }))
            .await
            .unwrap();

        match outcome {
            ActionOutcome::Saved {
                entry,
                completed_pending,
            } => {
                assert!(completed_pending);
                assert_eq!(entry.topic_key, key);
                assert_eq!(entry.source, RegistrySource::Manual);
                assert_eq!(entry.display_title, "Intro to Rust");
            }
            other => panic!("expected Saved, got {:?}", other),
        }
        assert!(router.registry.get_pending_topic().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_other_topic_upserts_directly() {
        let router = router();
        route_something(&router).await;

        let outcome = router
            .handle_action(RouteAction::Save(ActionData {
                topic_key: Some("tag:go".to_string()),
                display_title: Some("Go".to_string()),
                notebook_ref: Some("nb-go".to_string()),
                ..data()
            }))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ActionOutcome::Saved {
                completed_pending: false,
                ..
            }
        ));
        // Unrelated save leaves the pending topic in place
        assert!(router.registry.get_pending_topic().await.unwrap().is_some());
        assert!(router.registry.get_entry("tag:go").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_requires_notebook_ref() {
        let router = router();
        let err = router
            .handle_action(RouteAction::Save(ActionData {
                topic_key: Some("tag:go".to_string()),
                ..data()
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAction(_)));
    }

    #[tokio::test]
    async fn test_use_records_usage_and_clears_pending() {
        let router = router();
        router
            .handle_action(RouteAction::Save(ActionData {
                topic_key: Some("tag:rust".to_string()),
                notebook_ref: Some("nb-1".to_string()),
                ..data()
            }))
            .await
            .unwrap();
        route_something(&router).await;

        let outcome = router
            .handle_action(RouteAction::Use(ActionData {
                topic_key: Some("tag:rust".to_string()),
                ..data()
            }))
            .await
            .unwrap();

        match outcome {
            ActionOutcome::UsageRecorded { entry } => {
                assert_eq!(entry.unwrap().usage_count, 1)
            }
            other => panic!("expected UsageRecorded, got {:?}", other),
        }
        assert!(router.registry.get_pending_topic().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_does_not_mutate() {
        let router = router();
        router
            .handle_action(RouteAction::Save(ActionData {
                topic_key: Some("tag:rust".to_string()),
                notebook_ref: Some("nb-1".to_string()),
                notebook_url: Some("https://notebooks.test/nb-1".to_string()),
                ..data()
            }))
            .await
            .unwrap();
        let before = router.registry.list_entries().await.unwrap();

        let outcome = router
            .handle_action(RouteAction::Open(ActionData {
                topic_key: Some("tag:rust".to_string()),
                ..data()
            }))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Opened {
                notebook_url: Some("https://notebooks.test/nb-1".to_string())
            }
        );
        assert_eq!(router.registry.list_entries().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_create_refreshes_pending_without_registry() {
        let router = router();
        let key = route_something(&router).await;

        let outcome = router
            .handle_action(RouteAction::Create(ActionData {
                display_title: Some("Rust Ownership".to_string()),
                keywords: vec!["rust".to_string(), "ownership".to_string()],
                ..data()
            }))
            .await
            .unwrap();

        match outcome {
            ActionOutcome::PendingStaged { pending } => {
                assert_eq!(pending.topic_key, key);
                assert_eq!(pending.display_title, "Rust Ownership");
                assert_eq!(pending.keywords, vec!["rust", "ownership"]);
            }
            other => panic!("expected PendingStaged, got {:?}", other),
        }
        assert!(router.registry.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_from_scratch_needs_topic_key() {
        let router = router();
        assert!(router.handle_action(RouteAction::Create(data())).await.is_err());

        let outcome = router
            .handle_action(RouteAction::Create(ActionData {
                topic_key: Some("tag:ml".to_string()),
                source_title: Some("Gradient descent".to_string()),
                ..data()
            }))
            .await
            .unwrap();
        match outcome {
            ActionOutcome::PendingStaged { pending } => {
                assert_eq!(pending.topic_source, TopicSource::Tag);
                assert_eq!(pending.display_title, "Gradient descent");
                assert_eq!(pending.context.title, "Gradient descent");
            }
            other => panic!("expected PendingStaged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_skip_clears_pending_only() {
        let router = router();
        route_something(&router).await;

        let outcome = router.handle_action(RouteAction::Skip(data())).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Skipped { cleared: true });
        assert!(router.registry.list_entries().await.unwrap().is_empty());

        let again = router.handle_action(RouteAction::Skip(data())).await.unwrap();
        assert_eq!(again, ActionOutcome::Skipped { cleared: false });
    }

    #[test]
    fn test_source_of_key() {
        assert_eq!(source_of_key("tag:rust"), TopicSource::Tag);
        assert_eq!(source_of_key("dom:example.com"), TopicSource::Domain);
        assert_eq!(source_of_key("kw:yt:abc"), TopicSource::Keyword);
        assert_eq!(source_of_key("whatever"), TopicSource::Keyword);
    }
}
