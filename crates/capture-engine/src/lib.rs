//! capture-engine: routing captured reading fragments to notebooks
//!
//! This crate provides:
//! - [`TopicExtractor`]: capture → deterministic topic key (tag > domain > keywords)
//! - Scoring of a topic against registry entries and the routing decision
//! - [`Registry`] and the [`Router`] with its action state machine
//! - [`ExportQueue`], [`DedupeIndex`] and the background [`ExportWorker`]
//! - [`IdeaIncubator`]: engagement ledgers, suggestions and cooldowns
//! - [`EventBus`] for pending-topic, registry, job and suggestion events
//!
//! [`CaptureEngine`] wires all of them over one store.
//!
//! # Usage
//!
//! ```rust,ignore
//! use capture_engine::{CaptureEngine, EngineConfig};
//! use capture_store::MemoryStore;
//!
//! let engine = CaptureEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     capture_core::system_clock(),
//!     EngineConfig::from_env()?,
//! );
//! let outcome = engine.capture(&context, RouteOptions::default()).await?;
//! ```

pub mod actions;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod events;
pub mod extract;
pub mod incubator;
pub mod queue;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod tokenize;
pub mod worker;

use std::sync::Arc;

use capture_core::{
    ActionOutcome, CaptureContext, Clock, IdeaEvaluation, RegistryEntry, RouteAction,
    RouteOptions, RouterResult,
};
use capture_store::{DocumentStore, KvStore};
use serde::{Deserialize, Serialize};

pub use config::{ConfigError, EngineConfig};
pub use dedupe::{DedupeIndex, DedupeInput};
pub use error::{EngineError, EngineResult};
pub use events::{CaptureEvent, EventBus};
pub use extract::TopicExtractor;
pub use incubator::IdeaIncubator;
pub use queue::{EnqueueOutcome, ExportQueue, ExportRequest, GuardedUpdate, SubmitOutcome};
pub use registry::Registry;
pub use router::{Router, TitleProvider};
pub use scoring::{LexicalScorer, ScoringStrategy};
pub use worker::{ExportSink, ExportWorker, LogSink, SinkError, WorkerStats};

// Re-export dependent crates
pub use capture_core;
pub use capture_store;

/// Result of [`CaptureEngine::capture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub route: RouterResult,
    pub idea: IdeaEvaluation,
}

/// The router, queue and incubator over one store, clock and event bus.
#[derive(Clone)]
pub struct CaptureEngine {
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    router: Router,
    queue: ExportQueue,
    dedupe: DedupeIndex,
    incubator: IdeaIncubator,
}

impl CaptureEngine {
    pub fn new(backend: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self::with_events(backend, clock, config, EventBus::new())
    }

    /// Builds an engine that publishes on an existing bus.
    pub fn with_events(
        backend: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        events: EventBus,
    ) -> Self {
        let docs = DocumentStore::new(backend);
        let config = Arc::new(config);
        let extractor = TopicExtractor::new(config.max_keywords);

        let registry = Registry::new(docs.clone(), clock.clone(), events.clone());
        let router = Router::new(registry, extractor.clone(), clock.clone());
        let queue = ExportQueue::new(docs.clone(), clock.clone(), config.clone(), events.clone());
        let dedupe = DedupeIndex::new(
            docs.clone(),
            clock.clone(),
            config.dedupe_window,
            config.utc_offset,
        );
        let incubator = IdeaIncubator::new(docs, clock.clone(), extractor, events.clone());

        Self {
            config,
            clock,
            events,
            router,
            queue,
            dedupe,
            incubator,
        }
    }

    /// Relabels routed topics through `provider`.
    pub fn with_title_provider(mut self, provider: Arc<dyn TitleProvider>) -> Self {
        self.router = self.router.with_title_provider(provider);
        self
    }

    /// Routes one capture.
    pub async fn route(
        &self,
        context: &CaptureContext,
        options: RouteOptions,
    ) -> EngineResult<RouterResult> {
        self.router.route_topic(context, options).await
    }

    /// Routes one capture and feeds it to the incubator.
    pub async fn capture(
        &self,
        context: &CaptureContext,
        options: RouteOptions,
    ) -> EngineResult<CaptureOutcome> {
        let route = self.router.route_topic(context, options).await?;
        let idea = self.incubator.evaluate(context).await?;
        Ok(CaptureOutcome { route, idea })
    }

    pub async fn handle_action(&self, action: RouteAction) -> EngineResult<ActionOutcome> {
        self.router.handle_action(action).await
    }

    /// Deduplicates and queues an export.
    pub async fn submit_export(&self, request: ExportRequest) -> EngineResult<SubmitOutcome> {
        self.queue.submit(&self.dedupe, request).await
    }

    /// Passive learning hook; see [`Registry::observe_destination`].
    pub async fn observe_destination(
        &self,
        notebook_ref: &str,
        notebook_url: &str,
    ) -> EngineResult<Option<RegistryEntry>> {
        self.router
            .registry()
            .observe_destination(notebook_ref, notebook_url)
            .await
    }

    /// A worker delivering this engine's queue to `sink`.
    pub fn worker(&self, sink: Arc<dyn ExportSink>) -> ExportWorker {
        ExportWorker::new(
            self.queue.clone(),
            self.dedupe.clone(),
            sink,
            self.clock.clone(),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &Registry {
        self.router.registry()
    }

    pub fn queue(&self) -> &ExportQueue {
        &self.queue
    }

    pub fn dedupe(&self) -> &DedupeIndex {
        &self.dedupe
    }

    pub fn incubator(&self) -> &IdeaIncubator {
        &self.incubator
    }
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
