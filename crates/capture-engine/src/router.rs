//! Routing: capture → extracted topic → scored registry → decision.
//!
//! The router reads the registry and, when the user still has to decide
//! (`ask` or `create`), stages the topic in the pending slot so a later
//! action or a passive observer can complete the mapping. It never records
//! usage itself; that happens through actions.
//!
//! A [`TitleProvider`] may relabel the topic. The label is cosmetic: the
//! topic key stays a pure function of the capture so the next identical
//! capture finds the same entry.

use std::sync::Arc;

use async_trait::async_trait;
use capture_core::{
    BestMatch, CaptureContext, Clock, PendingTopic, RouteDecision, RouteOptions, RouterResult,
    Topic,
};
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::extract::TopicExtractor;
use crate::registry::Registry;
use crate::scoring::ASK_THRESHOLD;

/// Reason reported when there is nothing to match against.
pub const EMPTY_REGISTRY_REASON: &str = "Registry is empty";

/// An external "smart title" service.
#[async_trait]
pub trait TitleProvider: Send + Sync {
    /// Suggests a display title, or `None` to keep the extractor's label.
    async fn suggest_title(&self, topic: &Topic, context: &CaptureContext) -> Option<String>;
}

/// Orchestrates extraction, registry lookup and scoring.
#[derive(Clone)]
pub struct Router {
    pub(crate) registry: Registry,
    pub(crate) extractor: TopicExtractor,
    pub(crate) clock: Arc<dyn Clock>,
    titles: Option<Arc<dyn TitleProvider>>,
}

impl Router {
    pub fn new(registry: Registry, extractor: TopicExtractor, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            extractor,
            clock,
            titles: None,
        }
    }

    /// Uses `provider` to relabel routed topics.
    pub fn with_title_provider(mut self, provider: Arc<dyn TitleProvider>) -> Self {
        self.titles = Some(provider);
        self
    }

    /// The registry this router reads.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The extractor this router uses.
    pub fn extractor(&self) -> &TopicExtractor {
        &self.extractor
    }

    /// Routes one capture.
    pub async fn route_topic(
        &self,
        context: &CaptureContext,
        options: RouteOptions,
    ) -> EngineResult<RouterResult> {
        let topic = self.extractor.extract(context);
        let display_title = self.display_title(&topic, context).await;
        let entries = self.registry.list_entries().await?;

        let strategy = self.registry.strategy();
        let mut ranked = strategy
            .rank(
                &topic,
                &entries,
                options.max_alternatives.saturating_add(1),
                self.clock.now(),
            )
            .into_iter();

        let Some(best) = ranked.next() else {
            debug!(topic_key = %topic.topic_key, "Registry empty, proposing new notebook");
            let result = build_result(
                &topic,
                display_title,
                RouteDecision::Create,
                None,
                Vec::new(),
                EMPTY_REGISTRY_REASON.to_string(),
            );
            if options.save_pending {
                self.stage_pending(&result, context).await?;
            }
            return Ok(result);
        };

        let decision = strategy.decide(best.score);
        let reason = describe(decision, &best.entry.display_title, best.score, &best.reasons);

        debug!(
            topic_key = %topic.topic_key,
            best = %best.entry.topic_key,
            score = best.score,
            decision = %decision,
            "Routed capture"
        );

        let result = build_result(
            &topic,
            display_title,
            decision,
            Some(best.into()),
            ranked.map(BestMatch::from).collect(),
            reason,
        );

        if options.save_pending && decision != RouteDecision::UseExisting {
            self.stage_pending(&result, context).await?;
        }
        Ok(result)
    }

    async fn display_title(&self, topic: &Topic, context: &CaptureContext) -> String {
        let Some(provider) = &self.titles else {
            return topic.display_title.clone();
        };
        match provider.suggest_title(topic, context).await {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            Some(_) => {
                warn!(topic_key = %topic.topic_key, "Title provider returned a blank title");
                topic.display_title.clone()
            }
            None => topic.display_title.clone(),
        }
    }

    async fn stage_pending(&self, result: &RouterResult, context: &CaptureContext) -> EngineResult<()> {
        let pending = PendingTopic {
            topic_key: result.topic_key.clone(),
            topic_source: result.topic_source,
            display_title: result.display_title.clone(),
            keywords: result.keywords.clone(),
            confidence: result.confidence,
            context: context.clone(),
            created_at: self.clock.now(),
        };
        self.registry.set_pending_topic(pending).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("extractor", &self.extractor)
            .field("has_title_provider", &self.titles.is_some())
            .finish_non_exhaustive()
    }
}

fn build_result(
    topic: &Topic,
    display_title: String,
    decision: RouteDecision,
    best_match: Option<BestMatch>,
    alternatives: Vec<BestMatch>,
    reason: String,
) -> RouterResult {
    RouterResult {
        decision,
        best_match,
        alternatives,
        topic_key: topic.topic_key.clone(),
        topic_source: topic.topic_source,
        topic_label: topic.display_title.clone(),
        display_title,
        keywords: topic.keywords.clone(),
        confidence: topic.confidence,
        reason,
    }
}

fn describe(
    decision: RouteDecision,
    title: &str,
    score: f64,
    reasons: &[capture_core::MatchReason],
) -> String {
    let why = reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    match decision {
        RouteDecision::UseExisting => format!("Matched \"{}\" ({:.2}): {}", title, score, why),
        RouteDecision::Ask => format!("Closest match \"{}\" ({:.2}) needs confirmation", title, score),
        RouteDecision::Create => format!(
            "No match reached {:.2} (best \"{}\" at {:.2})",
            ASK_THRESHOLD, title, score
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use capture_core::{FixedClock, RegistrySource, RegistryUpsert};
    use capture_store::{DocumentStore, MemoryStore};
    use chrono::{TimeZone, Utc};

    struct ShoutingTitles;

    #[async_trait]
    impl TitleProvider for ShoutingTitles {
        async fn suggest_title(&self, topic: &Topic, _context: &CaptureContext) -> Option<String> {
            Some(topic.display_title.to_uppercase())
        }
    }

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

    fn rust_capture() -> CaptureContext {
        CaptureContext {
            title: "Intro to Rust".to_string(),
            selected_text: "ownership and borrowing".to_string(),
            domain: "youtube.com".to_string(),
            ..Default::default()
        }
    }

    async fn register(router: &Router, key: &str, title: &str, keywords: &[&str]) {
        router
            .registry
            .upsert_entry(RegistryUpsert {
                topic_key: key.to_string(),
                display_title: title.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                notebook_ref: format!("nb-{}", key),
                notebook_url: String::new(),
                source: RegistrySource::Manual,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_registry_creates_and_stages() {
        let router = router();
        let result = router
            .route_topic(&rust_capture(), RouteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.decision, RouteDecision::Create);
        assert_eq!(result.reason, EMPTY_REGISTRY_REASON);
        assert!(result.best_match.is_none());

        let pending = router.registry.get_pending_topic().await.unwrap().unwrap();
        assert_eq!(pending.topic_key, result.topic_key);
        assert!(pending.topic_key.starts_with("kw:"));
        assert_eq!(pending.context.title, "Intro to Rust");
    }

    #[tokio::test]
    async fn test_save_pending_false_leaves_slot_alone() {
        let router = router();
        let options = RouteOptions {
            save_pending: false,
            ..Default::default()
        };
        router.route_topic(&rust_capture(), options).await.unwrap();
        assert!(router.registry.get_pending_topic().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exact_key_uses_existing_without_pending() {
        let router = router();
        register(&router, "tag:rust", "Rust", &["rust"]).await;

        let capture = CaptureContext {
            tags: vec!["rust".to_string()],
            ..rust_capture()
        };
        let result = router
            .route_topic(&capture, RouteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.decision, RouteDecision::UseExisting);
        let best = result.best_match.unwrap();
        assert_eq!(best.topic_key, "tag:rust");
        assert_eq!(best.notebook_ref, "nb-tag:rust");
        assert!(router.registry.get_pending_topic().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alternatives_limited() {
        let router = router();
        for i in 0..6 {
            register(&router, &format!("kw:{}", i), "Notes", &["rust"]).await;
        }
        let options = RouteOptions {
            max_alternatives: 2,
            ..Default::default()
        };
        let result = router.route_topic(&rust_capture(), options).await.unwrap();
        assert!(result.best_match.is_some());
        assert_eq!(result.alternatives.len(), 2);
    }

    #[tokio::test]
    async fn test_weak_match_asks_and_stages() {
        let router = router();
        // Two exact keywords (0.5) plus recency (0.10) lands in the ask band
        register(&router, "kw:other", "Something else", &["ownership", "borrowing"]).await;

        let result = router
            .route_topic(&rust_capture(), RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.decision, RouteDecision::Ask);
        assert!(router.registry.get_pending_topic().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_title_provider_changes_label_not_key() {
        let plain = router();
        let smart = router().with_title_provider(Arc::new(ShoutingTitles));

        let a = plain
            .route_topic(&rust_capture(), RouteOptions::default())
            .await
            .unwrap();
        let b = smart
            .route_topic(&rust_capture(), RouteOptions::default())
            .await
            .unwrap();

        assert_eq!(a.topic_key, b.topic_key);
        assert_eq!(b.display_title, "INTRO TO RUST");
        assert_eq!(b.topic_label, "Intro to Rust");

        let pending = smart.registry.get_pending_topic().await.unwrap().unwrap();
        assert_eq!(pending.display_title, "INTRO TO RUST");
    }
}
