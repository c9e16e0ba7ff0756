//! The durable export queue.
//!
//! The queue is a passive list of [`ExportJob`]s under
//! [`keys::EXPORT_QUEUE`]. Nothing in here runs on a timer: `nextAttemptAt`
//! is advisory data for whoever drains the queue (see
//! [`ExportWorker`](crate::worker::ExportWorker)).
//!
//! ## Bounds
//!
//! After every insertion the queue is trimmed back to `max_queue_size` by
//! evicting the oldest `queued` jobs. Jobs in any other status are never
//! evicted, and neither is the job being inserted, so the queue may stay
//! over budget when nothing else is evictable.
//!
//! ## Retries
//!
//! A failed delivery goes back to `queued` with a delay taken from the
//! retry ladder (`ladder[min(attempts, len - 1)]`). Once a job has been
//! started `max_attempts` times, or has been alive longer than the TTL, it
//! is marked `failed` and left in the queue for the caller to see.

use std::sync::Arc;

use capture_core::{
    Clock, ExportJob, ExportMode, JobPatch, JobSnapshot, JobStatus, NewExportJob,
};
use capture_store::{DocumentStore, Mutation, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dedupe::{DedupeIndex, DedupeInput};
use crate::error::EngineResult;
use crate::events::{CaptureEvent, EventBus};

/// Error recorded on jobs failed by [`ExportQueue::sweep_expired`].
pub const EXPIRED_ERROR: &str = "expired";

/// Result of inserting a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOutcome {
    pub job: ExportJob,
    /// False if a job with the same id was already queued.
    pub inserted: bool,
    /// Jobs evicted to respect the queue bound.
    pub evicted: Vec<Uuid>,
}

/// A request to export one captured passage to one notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportRequest {
    pub bundle_id: String,
    pub notebook_ref: String,
    pub url: String,
    #[serde(alias = "selection")]
    pub selected_text: String,
    pub captured_at: Option<DateTime<Utc>>,
    pub mode: ExportMode,
}

/// Result of [`ExportQueue::submit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The job was queued.
    Enqueued {
        job: ExportJob,
        evicted: Vec<Uuid>,
    },
    /// The same content already went (or is going) to this notebook.
    Duplicate {
        #[serde(rename = "dedupeKey")]
        dedupe_key: String,
        /// The active job carrying the same key, if that is why.
        #[serde(rename = "existingJobId")]
        existing_job_id: Option<Uuid>,
    },
}

/// Result of an optimistic job update.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedUpdate {
    /// The patch was written.
    Applied(ExportJob),
    /// The job changed underneath the caller; nothing was written.
    Discarded(ExportJob),
    /// No such job.
    NotFound,
}

/// Durable, bounded export queue.
#[derive(Clone)]
pub struct ExportQueue {
    docs: DocumentStore,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    events: EventBus,
}

impl ExportQueue {
    pub fn new(
        docs: DocumentStore,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
        events: EventBus,
    ) -> Self {
        Self {
            docs,
            clock,
            config,
            events,
        }
    }

    /// Builds a queued job. Does not persist it.
    pub fn create_export_job(&self, new: NewExportJob) -> ExportJob {
        let now = self.clock.now();
        ExportJob {
            job_id: Uuid::new_v4(),
            bundle_id: new.bundle_id,
            notebook_ref: new.notebook_ref,
            dedupe_key: new.dedupe_key,
            mode: new.mode,
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            next_attempt_at: now + self.config.retry_delay(0),
            last_error: None,
            updated_at: now,
        }
    }

    /// Appends `job`, then evicts the oldest queued jobs past the bound.
    ///
    /// Idempotent on `job_id`: re-enqueueing a known job changes nothing.
    pub async fn enqueue_export_job(&self, job: ExportJob) -> EngineResult<EnqueueOutcome> {
        let max = self.config.max_queue_size;
        let outcome = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                if let Some(existing) = jobs.iter().find(|j| j.job_id == job.job_id) {
                    return Mutation::Discard(EnqueueOutcome {
                        job: existing.clone(),
                        inserted: false,
                        evicted: Vec::new(),
                    });
                }
                let evicted = push_and_evict(jobs, job.clone(), max);
                Mutation::Write(EnqueueOutcome {
                    job: job.clone(),
                    inserted: true,
                    evicted,
                })
            })
            .await?;

        if outcome.inserted {
            self.announce_enqueue(&outcome.job, &outcome.evicted);
        } else {
            debug!(job_id = %outcome.job.job_id, "Job already queued");
        }
        Ok(outcome)
    }

    /// Deduplicates, then creates and enqueues an export.
    ///
    /// A request is a duplicate if its key was delivered within the dedupe
    /// window or an active job already carries it.
    pub async fn submit(
        &self,
        dedupe: &DedupeIndex,
        request: ExportRequest,
    ) -> EngineResult<SubmitOutcome> {
        let dedupe_key = dedupe.build_dedupe_key(&DedupeInput {
            url: request.url.clone(),
            selected_text: request.selected_text.clone(),
            notebook_ref: request.notebook_ref.clone(),
            captured_at: request.captured_at,
        });

        if dedupe.is_dedupe_hit(&dedupe_key).await? {
            debug!(dedupe_key = %dedupe_key, "Export suppressed by dedupe index");
            return Ok(SubmitOutcome::Duplicate {
                dedupe_key,
                existing_job_id: None,
            });
        }

        let job = self.create_export_job(NewExportJob {
            bundle_id: request.bundle_id,
            notebook_ref: request.notebook_ref,
            dedupe_key: dedupe_key.clone(),
            mode: request.mode,
        });
        let max = self.config.max_queue_size;

        let outcome = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                if let Some(active) = jobs
                    .iter()
                    .find(|j| j.dedupe_key == dedupe_key && j.status.is_active())
                {
                    return Mutation::Discard(SubmitOutcome::Duplicate {
                        dedupe_key: dedupe_key.clone(),
                        existing_job_id: Some(active.job_id),
                    });
                }
                let evicted = push_and_evict(jobs, job.clone(), max);
                Mutation::Write(SubmitOutcome::Enqueued {
                    job: job.clone(),
                    evicted,
                })
            })
            .await?;

        match &outcome {
            SubmitOutcome::Enqueued { job, evicted } => self.announce_enqueue(job, evicted),
            SubmitOutcome::Duplicate {
                existing_job_id, ..
            } => debug!(
                dedupe_key = %dedupe_key,
                existing = ?existing_job_id,
                "Export already in flight"
            ),
        }
        Ok(outcome)
    }

    fn announce_enqueue(&self, job: &ExportJob, evicted: &[Uuid]) {
        info!(
            job_id = %job.job_id,
            notebook_ref = %job.notebook_ref,
            "Export job enqueued"
        );
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted oldest queued jobs");
        }
        self.events
            .publish(CaptureEvent::JobEnqueued { job: job.clone() });
    }

    /// Moves a job to `status`.
    ///
    /// Entering `running` counts an attempt. `last_error` is recorded when
    /// given; a job that reaches `done` has its error cleared.
    pub async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        last_error: Option<String>,
    ) -> EngineResult<Option<ExportJob>> {
        let now = self.clock.now();
        self.modify(job_id, |job| {
            if status == JobStatus::Running {
                job.attempts = job.attempts.saturating_add(1);
            }
            job.status = status;
            match (&last_error, status) {
                (Some(err), _) => job.last_error = Some(err.clone()),
                (None, JobStatus::Done) => job.last_error = None,
                (None, _) => {}
            }
            job.updated_at = now;
        })
        .await
    }

    /// Applies a merge-patch to a job, last write wins.
    pub async fn update_job(&self, job_id: Uuid, patch: JobPatch) -> EngineResult<Option<ExportJob>> {
        let now = self.clock.now();
        self.modify(job_id, |job| {
            patch.apply(job);
            job.updated_at = now;
        })
        .await
    }

    /// Applies a merge-patch only if the job still matches `seen`.
    ///
    /// A job that moved from `queued` to `running` since `seen` was taken
    /// still accepts the patch; that is the processor picking it up.
    pub async fn update_job_guarded(
        &self,
        job_id: Uuid,
        seen: JobSnapshot,
        patch: JobPatch,
    ) -> EngineResult<GuardedUpdate> {
        let now = self.clock.now();
        let result = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) else {
                    return Mutation::Discard(GuardedUpdate::NotFound);
                };
                let current = job.snapshot();
                let auto_started =
                    seen.status == JobStatus::Queued && current.status == JobStatus::Running;
                if current != seen && !auto_started {
                    return Mutation::Discard(GuardedUpdate::Discarded(job.clone()));
                }
                patch.apply(job);
                job.updated_at = now;
                Mutation::Write(GuardedUpdate::Applied(job.clone()))
            })
            .await?;

        match &result {
            GuardedUpdate::Applied(job) => {
                self.events
                    .publish(CaptureEvent::JobUpdated { job: job.clone() });
            }
            GuardedUpdate::Discarded(job) => {
                debug!(job_id = %job.job_id, status = %job.status, "Stale job update discarded");
            }
            GuardedUpdate::NotFound => {}
        }
        Ok(result)
    }

    /// Moves a queued job to `running` if it is still exactly as `seen`.
    ///
    /// Unlike [`update_job_guarded`](Self::update_job_guarded) this refuses a
    /// job that is already running, so two processors never both start it.
    pub async fn claim_job(&self, job_id: Uuid, seen: JobSnapshot) -> EngineResult<Option<ExportJob>> {
        let now = self.clock.now();
        let claimed = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                match jobs.iter_mut().find(|j| j.job_id == job_id) {
                    Some(job) if job.status == JobStatus::Queued && job.snapshot() == seen => {
                        job.status = JobStatus::Running;
                        job.attempts = job.attempts.saturating_add(1);
                        job.updated_at = now;
                        Mutation::Write(Some(job.clone()))
                    }
                    _ => Mutation::Discard(None),
                }
            })
            .await?;

        if let Some(job) = &claimed {
            self.events
                .publish(CaptureEvent::JobUpdated { job: job.clone() });
        }
        Ok(claimed)
    }

    /// Schedules the next attempt after a failed delivery, or fails the job
    /// permanently once it is exhausted.
    pub async fn schedule_retry(&self, job_id: Uuid, error: &str) -> EngineResult<Option<ExportJob>> {
        let now = self.clock.now();
        let config = self.config.clone();
        let job = self
            .modify(job_id, |job| {
                job.last_error = Some(error.to_string());
                job.updated_at = now;
                if is_exhausted(job, &config, now) {
                    job.status = JobStatus::Failed;
                } else {
                    job.status = JobStatus::Queued;
                    job.next_attempt_at = now + config.retry_delay(job.attempts);
                }
            })
            .await?;

        if let Some(job) = &job {
            match job.status {
                JobStatus::Failed => warn!(
                    job_id = %job.job_id,
                    attempts = job.attempts,
                    error,
                    "Export job failed permanently"
                ),
                _ => debug!(
                    job_id = %job.job_id,
                    attempts = job.attempts,
                    next_attempt_at = %job.next_attempt_at,
                    "Export retry scheduled"
                ),
            }
        }
        Ok(job)
    }

    /// Removes a job. Returns it if it existed.
    pub async fn dequeue_job(&self, job_id: Uuid) -> EngineResult<Option<ExportJob>> {
        let removed = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                match jobs.iter().position(|j| j.job_id == job_id) {
                    Some(idx) => Mutation::Write(Some(jobs.remove(idx))),
                    None => Mutation::Discard(None),
                }
            })
            .await?;
        if removed.is_some() {
            info!(job_id = %job_id, "Export job dequeued");
        }
        Ok(removed)
    }

    /// Every job, optionally filtered by status, in queue order.
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> EngineResult<Vec<ExportJob>> {
        let jobs: Vec<ExportJob> = self.docs.load_or_default(keys::EXPORT_QUEUE).await?;
        Ok(jobs
            .into_iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .collect())
    }

    pub async fn get_job(&self, job_id: Uuid) -> EngineResult<Option<ExportJob>> {
        Ok(self
            .list_jobs(None)
            .await?
            .into_iter()
            .find(|j| j.job_id == job_id))
    }

    /// Queued jobs whose next attempt is due at `now`, earliest first.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> EngineResult<Vec<ExportJob>> {
        let mut due: Vec<ExportJob> = self
            .list_jobs(Some(JobStatus::Queued))
            .await?
            .into_iter()
            .filter(|j| j.next_attempt_at <= now)
            .collect();
        due.sort_by(|a, b| {
            a.next_attempt_at
                .cmp(&b.next_attempt_at)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(due)
    }

    /// Fails unfinished jobs that outlived the TTL, including running jobs
    /// whose processor never reported back. Returns the failed jobs.
    pub async fn sweep_expired(&self) -> EngineResult<Vec<ExportJob>> {
        let now = self.clock.now();
        let ttl = self.config.job_ttl;
        let expired = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                let mut expired = Vec::new();
                for job in jobs.iter_mut() {
                    if job.status.is_active() && now - job.created_at >= ttl {
                        job.status = JobStatus::Failed;
                        job.last_error = Some(EXPIRED_ERROR.to_string());
                        job.updated_at = now;
                        expired.push(job.clone());
                    }
                }
                if expired.is_empty() {
                    Mutation::Discard(expired)
                } else {
                    Mutation::Write(expired)
                }
            })
            .await?;

        for job in &expired {
            warn!(job_id = %job.job_id, "Export job expired");
            self.events
                .publish(CaptureEvent::JobUpdated { job: job.clone() });
        }
        Ok(expired)
    }

    async fn modify<F>(&self, job_id: Uuid, mut f: F) -> EngineResult<Option<ExportJob>>
    where
        F: FnMut(&mut ExportJob),
    {
        let updated = self
            .docs
            .update(keys::EXPORT_QUEUE, |jobs: &mut Vec<ExportJob>| {
                match jobs.iter_mut().find(|j| j.job_id == job_id) {
                    Some(job) => {
                        f(job);
                        Mutation::Write(Some(job.clone()))
                    }
                    None => Mutation::Discard(None),
                }
            })
            .await?;

        if let Some(job) = &updated {
            self.events
                .publish(CaptureEvent::JobUpdated { job: job.clone() });
        }
        Ok(updated)
    }
}

impl std::fmt::Debug for ExportQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportQueue")
            .field("max_queue_size", &self.config.max_queue_size)
            .finish_non_exhaustive()
    }
}

/// True once a job may not be retried again.
pub fn is_exhausted(job: &ExportJob, config: &EngineConfig, now: DateTime<Utc>) -> bool {
    job.attempts >= config.max_attempts || now - job.created_at >= config.job_ttl
}

/// Appends `job` and evicts the oldest queued jobs (other than `job`)
/// until the queue is within `max`. Returns the evicted ids.
fn push_and_evict(jobs: &mut Vec<ExportJob>, job: ExportJob, max: usize) -> Vec<Uuid> {
    let new_id = job.job_id;
    jobs.push(job);

    let mut evicted = Vec::new();
    while jobs.len() > max {
        let oldest = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Queued && j.job_id != new_id)
            .min_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then(ia.cmp(ib)))
            .map(|(idx, _)| idx);
        match oldest {
            Some(idx) => evicted.push(jobs.remove(idx).job_id),
            None => break,
        }
    }
    evicted
}
