//! End-to-end scenarios over the full engine and an in-memory store.
//!
//! Each test builds a [`CaptureEngine`] on a pinned clock and drives it the
//! way the capture surface would: route, act on the decision, export, and
//! feed the incubator.

use std::sync::Arc;

use capture_engine::capture_core::{
    ActionData, ActionOutcome, CaptureContext, Clock, DismissKind, ExportMode, FixedClock, JobStatus,
    ReadingMode, RegistryEntry, RegistrySource, RouteAction, RouteDecision, RouteOptions,
    SuggestionStatus,
};
use capture_engine::capture_store::{DocumentStore, JsonFileStore, MemoryStore, keys};
use capture_engine::{CaptureEngine, EngineConfig, ExportRequest, LogSink, SubmitOutcome};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

// =============================================================================
// Test Helpers
// =============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 10, 9, 0, 0).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        utc_offset: FixedOffset::east_opt(0).unwrap(),
        ..EngineConfig::default()
    }
}

fn engine_with(config: EngineConfig) -> (CaptureEngine, FixedClock, Arc<MemoryStore>) {
    let clock = FixedClock::new(start());
    let backend = Arc::new(MemoryStore::new());
    let engine = CaptureEngine::new(backend.clone(), Arc::new(clock.clone()), config);
    (engine, clock, backend)
}

fn engine() -> (CaptureEngine, FixedClock, Arc<MemoryStore>) {
    engine_with(config())
}

fn rust_video() -> CaptureContext {
    CaptureContext {
        title: "Intro to Rust".to_string(),
        url: "https://www.youtube.com/watch?v=abc".to_string(),
        domain: "youtube.com".to_string(),
        selected_text: "ownership and borrowing".to_string(),
        ..Default::default()
    }
}

fn engaged_rust_read(n: usize) -> CaptureContext {
    CaptureContext {
        title: "Rust async deep dive".to_string(),
        url: format!("https://docs.example.org/async/{}", n),
        selected_text: "pinning guarantees the future is not moved".to_string(),
        tags: vec!["rust".to_string()],
        atomic_thought: Some("Pin is about addresses, not mutability".to_string()),
        reading_mode: Some(ReadingMode::Deep),
        ..Default::default()
    }
}

fn export_request(selection: &str) -> ExportRequest {
    ExportRequest {
        bundle_id: "bundle-1".to_string(),
        notebook_ref: "nb-rust".to_string(),
        url: "https://blog.example.com/ownership".to_string(),
        selected_text: selection.to_string(),
        captured_at: None,
        mode: ExportMode::Manual,
    }
}

// =============================================================================
// Routing
// =============================================================================

/// A broad site gives no domain signal, so the keyword tier applies and an
/// empty registry proposes a new notebook.
#[tokio::test]
async fn empty_registry_on_broad_domain_creates_keyword_topic() {
    let (engine, _, _) = engine();

    let result = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.decision, RouteDecision::Create);
    assert_eq!(result.reason, "Registry is empty");
    assert!(result.topic_key.starts_with("kw:"));

    let pending = engine.registry().get_pending_topic().await.unwrap().unwrap();
    assert_eq!(pending.topic_key, result.topic_key);
}

/// Identical content always yields the same key, whatever else differs.
#[tokio::test]
async fn routing_is_deterministic() {
    let (engine, clock, _) = engine();

    let first = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();
    clock.advance(Duration::days(3));
    let second = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();

    assert_eq!(first.topic_key, second.topic_key);
    assert_eq!(first.keywords, second.keywords);
}

/// A heavily used tag notebook wins on the exact key alone.
#[tokio::test]
async fn tagged_capture_uses_existing_notebook() {
    let (engine, clock, backend) = engine();
    let entry = RegistryEntry {
        topic_key: "tag:rust".to_string(),
        display_title: "Rust".to_string(),
        keywords: vec!["rust".to_string()],
        notebook_ref: "nb-rust".to_string(),
        notebook_url: "https://notebooks.example/nb-rust".to_string(),
        usage_count: 50,
        last_used_at: clock.now() - Duration::days(1),
        source: RegistrySource::Manual,
        created_at: clock.now() - Duration::days(200),
    };
    DocumentStore::new(backend)
        .save(keys::REGISTRY, &vec![entry])
        .await
        .unwrap();

    let capture = CaptureContext {
        tags: vec!["rust".to_string()],
        ..rust_video()
    };
    let result = engine.route(&capture, RouteOptions::default()).await.unwrap();

    assert_eq!(result.decision, RouteDecision::UseExisting);
    let best = result.best_match.unwrap();
    assert_eq!(best.topic_key, "tag:rust");
    assert!(best.score >= 0.70);
}

/// create → save turns the pending topic into a mapping the next identical
/// capture routes to directly.
#[tokio::test]
async fn saved_pending_topic_is_used_next_time() {
    let (engine, _, _) = engine();

    let first = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(first.decision, RouteDecision::Create);

    let outcome = engine
        .handle_action(RouteAction::Save(ActionData {
            topic_key: Some(first.topic_key.clone()),
            notebook_ref: Some("nb-rust".to_string()),
            notebook_url: Some("https://notebooks.example/nb-rust".to_string()),
            ..Default::default()
        }))
        .await
        .unwrap();
    match outcome {
        ActionOutcome::Saved {
            entry,
            completed_pending,
        } => {
            assert!(completed_pending);
            assert_eq!(entry.source, RegistrySource::Manual);
            assert_eq!(entry.usage_count, 0);
        }
        other => panic!("expected Saved, got {:?}", other),
    }
    assert!(engine.registry().get_pending_topic().await.unwrap().is_none());

    let second = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(second.decision, RouteDecision::UseExisting);
    assert_eq!(second.best_match.unwrap().notebook_ref, "nb-rust");

    let used = engine
        .handle_action(RouteAction::Use(ActionData {
            topic_key: Some(second.topic_key),
            ..Default::default()
        }))
        .await
        .unwrap();
    match used {
        ActionOutcome::UsageRecorded { entry } => assert_eq!(entry.unwrap().usage_count, 1),
        other => panic!("expected UsageRecorded, got {:?}", other),
    }
}

/// An export observed without a save teaches the registry a learned entry.
#[tokio::test]
async fn observed_export_learns_pending_topic() {
    let (engine, _, _) = engine();
    let routed = engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();

    let learned = engine
        .observe_destination("nb-video", "https://notebooks.example/nb-video")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(learned.topic_key, routed.topic_key);
    assert_eq!(learned.source, RegistrySource::Learned);

    // Nothing pending any more, so a second observation learns nothing
    assert!(engine
        .observe_destination("nb-video", "")
        .await
        .unwrap()
        .is_none());
}

/// skip drops the pending topic and leaves the registry empty.
#[tokio::test]
async fn skip_clears_pending_topic() {
    let (engine, _, _) = engine();
    engine
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();

    let outcome = engine
        .handle_action(RouteAction::Skip(ActionData::default()))
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Skipped { cleared: true });
    assert!(engine.registry().list_entries().await.unwrap().is_empty());
}

// =============================================================================
// Export queue
// =============================================================================

/// N+1 jobs into a queue bounded to N evict the oldest queued job only.
#[tokio::test]
async fn bounded_queue_evicts_oldest_queued_job() {
    let (engine, clock, _) = engine_with(EngineConfig {
        max_queue_size: 3,
        ..config()
    });

    let mut jobs = Vec::new();
    for n in 0..3 {
        let outcome = engine
            .submit_export(export_request(&format!("passage {}", n)))
            .await
            .unwrap();
        match outcome {
            SubmitOutcome::Enqueued { job, .. } => jobs.push(job),
            other => panic!("expected Enqueued, got {:?}", other),
        }
        clock.advance(Duration::seconds(1));
    }
    engine
        .queue()
        .update_job_status(jobs[0].job_id, JobStatus::Running, None)
        .await
        .unwrap();

    let evicted = match engine
        .submit_export(export_request("passage 3"))
        .await
        .unwrap()
    {
        SubmitOutcome::Enqueued { evicted, .. } => evicted,
        other => panic!("expected Enqueued, got {:?}", other),
    };
    assert_eq!(evicted, vec![jobs[1].job_id]);

    let remaining = engine.queue().list_jobs(None).await.unwrap();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().any(|j| j.job_id == jobs[0].job_id));
}

/// A delivered export suppresses the same passage for the rest of the day.
#[tokio::test]
async fn delivered_export_is_deduplicated() {
    let (engine, clock, _) = engine();
    let worker = engine.worker(Arc::new(LogSink));

    let job = match engine
        .submit_export(export_request("borrowing"))
        .await
        .unwrap()
    {
        SubmitOutcome::Enqueued { job, .. } => job,
        other => panic!("expected Enqueued, got {:?}", other),
    };

    clock.advance(Duration::seconds(5));
    assert_eq!(worker.run_once().await.unwrap(), 1);
    let done = engine.queue().get_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Done);

    clock.advance(Duration::hours(2));
    assert!(matches!(
        engine.submit_export(export_request("borrowing")).await.unwrap(),
        SubmitOutcome::Duplicate { .. }
    ));

    // Past the window and on a new local day the key differs anyway
    clock.advance(Duration::hours(24));
    assert!(matches!(
        engine.submit_export(export_request("borrowing")).await.unwrap(),
        SubmitOutcome::Enqueued { .. }
    ));
}

// =============================================================================
// Idea incubator
// =============================================================================

/// Four captures never fire, however engaged; the fifth does.
#[tokio::test]
async fn bundle_floor_gates_suggestions() {
    let (engine, clock, _) = engine();

    for n in 0..4 {
        let outcome = engine
            .capture(&engaged_rust_read(n), RouteOptions::default())
            .await
            .unwrap();
        assert!(!outcome.idea.should_prompt);
        assert!(outcome.idea.suggestion.is_none());
        clock.advance(Duration::hours(6));
    }

    let outcome = engine
        .capture(&engaged_rust_read(4), RouteOptions::default())
        .await
        .unwrap();
    assert!(outcome.idea.should_prompt);
    let suggestion = outcome.idea.suggestion.unwrap();
    assert_eq!(suggestion.topic_key, "tag:rust");
    assert_eq!(suggestion.reason.total_bundles, 5);
    assert_eq!(suggestion.reason.deep_count, 5);
}

/// "Don't ask" keeps the topic silent ten days later, even past the gate.
#[tokio::test]
async fn dont_ask_suppresses_later_captures() {
    let (engine, clock, _) = engine();

    engine
        .incubator()
        .record_idea_dismiss("tag:rust", DismissKind::DontAsk)
        .await
        .unwrap();
    clock.advance(Duration::days(10));

    for n in 0..6 {
        let outcome = engine
            .capture(&engaged_rust_read(n), RouteOptions::default())
            .await
            .unwrap();
        assert!(outcome.idea.suggestion.is_none());
        assert!(!outcome.idea.should_prompt);
    }
    assert!(engine.incubator().get_stats("tag:rust").await.unwrap().is_none());
}

/// Two "not now" within 30 days escalate to 30 days; "don't ask" is 90.
#[tokio::test]
async fn cooldown_escalation() {
    let (engine, clock, _) = engine();
    let incubator = engine.incubator();

    let first = incubator
        .record_idea_dismiss("kw:abc", DismissKind::NotNow)
        .await
        .unwrap();
    assert_eq!(first.until, Some(clock.now() + Duration::days(7)));

    clock.advance(Duration::days(12));
    let second = incubator
        .record_idea_dismiss("kw:abc", DismissKind::NotNow)
        .await
        .unwrap();
    assert_eq!(second.dismiss_count, 2);
    assert_eq!(second.until, Some(clock.now() + Duration::days(30)));

    let hard = incubator
        .record_idea_dismiss("kw:abc", DismissKind::DontAsk)
        .await
        .unwrap();
    assert!(hard.hard_until.unwrap() >= clock.now() + Duration::days(90));
    assert_eq!(hard.dismiss_count, 0);
}

/// Dismissing closes the open suggestion; accepting is recorded as such.
#[tokio::test]
async fn suggestion_lifecycle() {
    let (engine, _, _) = engine();
    for n in 0..5 {
        engine
            .capture(&engaged_rust_read(n), RouteOptions::default())
            .await
            .unwrap();
    }
    let open = engine
        .incubator()
        .list_suggestions(Some(SuggestionStatus::Open))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);

    engine
        .incubator()
        .record_idea_dismiss("tag:rust", DismissKind::NotNow)
        .await
        .unwrap();
    let dismissed = engine
        .incubator()
        .list_suggestions(Some(SuggestionStatus::Dismissed))
        .await
        .unwrap();
    assert_eq!(dismissed.len(), 1);
    assert_eq!(dismissed[0].id, open[0].id);
}

// =============================================================================
// Persistence
// =============================================================================

/// Mappings and the pending topic survive a restart over the file store.
#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FixedClock::new(start());

    let first = CaptureEngine::new(
        Arc::new(JsonFileStore::open(dir.path()).await.unwrap()),
        Arc::new(clock.clone()),
        config(),
    );
    let routed = first
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(routed.decision, RouteDecision::Create);
    drop(first);

    let second = CaptureEngine::new(
        Arc::new(JsonFileStore::open(dir.path()).await.unwrap()),
        Arc::new(clock),
        config(),
    );
    let pending = second.registry().get_pending_topic().await.unwrap().unwrap();
    assert_eq!(pending.topic_key, routed.topic_key);

    second
        .handle_action(RouteAction::Save(ActionData {
            notebook_ref: Some("nb-rust".to_string()),
            ..Default::default()
        }))
        .await
        .unwrap();
    let again = second
        .route(&rust_video(), RouteOptions::default())
        .await
        .unwrap();
    assert_eq!(again.decision, RouteDecision::UseExisting);
}
