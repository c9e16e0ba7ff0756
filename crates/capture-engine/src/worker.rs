//! Background delivery of queued exports.
//!
//! The worker polls the [`ExportQueue`] on an interval, claims every due
//! job, hands it to an [`ExportSink`] and records the outcome:
//!
//! - delivered: job `done`, dedupe key marked as hit
//! - transient failure: back to `queued` on the retry ladder
//! - permanent failure: job `failed` at once
//!
//! Claiming is a compare-and-swap on the job's `(status, updatedAt)`, so
//! several workers over the same store never start the same job twice.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capture_core::{Clock, ExportJob, JobPatch, JobStatus};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dedupe::DedupeIndex;
use crate::error::EngineResult;
use crate::queue::{ExportQueue, GuardedUpdate};

/// Why a delivery did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Worth retrying later.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("delivery rejected: {0}")]
    Permanent(String),
}

/// Where exports are delivered.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn deliver(&self, job: &ExportJob) -> Result<(), SinkError>;
}

/// A sink that only logs. Useful when no downstream is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ExportSink for LogSink {
    async fn deliver(&self, job: &ExportJob) -> Result<(), SinkError> {
        info!(
            job_id = %job.job_id,
            bundle_id = %job.bundle_id,
            notebook_ref = %job.notebook_ref,
            "Export delivered to log sink"
        );
        Ok(())
    }
}

/// Statistics for the export worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs_delivered: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    /// Due jobs another processor claimed first.
    pub jobs_skipped: u64,
    pub jobs_expired: u64,
}

#[derive(Clone)]
struct Processor {
    queue: ExportQueue,
    dedupe: DedupeIndex,
    sink: Arc<dyn ExportSink>,
    clock: Arc<dyn Clock>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl Processor {
    fn bump(&self, f: impl FnOnce(&mut WorkerStats)) {
        if let Ok(mut s) = self.stats.lock() {
            f(&mut s);
        }
    }

    async fn run_once(&self) -> EngineResult<usize> {
        let expired = self.queue.sweep_expired().await?;
        if !expired.is_empty() {
            self.bump(|s| s.jobs_expired += expired.len() as u64);
        }

        let due = self.queue.due_jobs(self.clock.now()).await?;
        let mut handled = 0;
        for job in due {
            if self.process(job).await? {
                handled += 1;
            }
        }
        Ok(handled)
    }

    async fn process(&self, job: ExportJob) -> EngineResult<bool> {
        let Some(running) = self.queue.claim_job(job.job_id, job.snapshot()).await? else {
            debug!(job_id = %job.job_id, "Job claimed elsewhere, skipping");
            self.bump(|s| s.jobs_skipped += 1);
            return Ok(false);
        };

        let start = std::time::Instant::now();
        match self.sink.deliver(&running).await {
            Ok(()) => {
                let done = JobPatch {
                    status: Some(JobStatus::Done),
                    last_error: Some(None),
                    ..Default::default()
                };
                match self
                    .queue
                    .update_job_guarded(running.job_id, running.snapshot(), done)
                    .await?
                {
                    GuardedUpdate::Applied(_) => {}
                    GuardedUpdate::Discarded(current) => warn!(
                        job_id = %current.job_id,
                        status = %current.status,
                        "Job changed during delivery, leaving it as is"
                    ),
                    GuardedUpdate::NotFound => {
                        debug!(job_id = %running.job_id, "Job dequeued during delivery")
                    }
                }
                // Delivered content is a dedupe hit whatever happened to the record
                self.dedupe.mark_dedupe_hit(&running.dedupe_key).await?;
                info!(
                    job_id = %running.job_id,
                    attempts = running.attempts,
                    elapsed = ?start.elapsed(),
                    "Export delivered"
                );
                self.bump(|s| s.jobs_delivered += 1);
            }
            Err(SinkError::Transient(reason)) => {
                warn!(job_id = %running.job_id, %reason, "Export delivery failed");
                let retried = self.queue.schedule_retry(running.job_id, &reason).await?;
                match retried.map(|j| j.status) {
                    Some(JobStatus::Failed) => self.bump(|s| s.jobs_failed += 1),
                    _ => self.bump(|s| s.jobs_retried += 1),
                }
            }
            Err(SinkError::Permanent(reason)) => {
                warn!(job_id = %running.job_id, %reason, "Export rejected");
                self.queue
                    .update_job_status(running.job_id, JobStatus::Failed, Some(reason))
                    .await?;
                self.bump(|s| s.jobs_failed += 1);
            }
        }
        Ok(true)
    }
}

/// Background worker draining the export queue.
pub struct ExportWorker {
    processor: Processor,

    /// Poll interval for checking the queue.
    poll_interval: Duration,

    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,

    /// Shutdown signal receiver for spawned tasks.
    shutdown_rx: watch::Receiver<bool>,
}

impl ExportWorker {
    pub fn new(
        queue: ExportQueue,
        dedupe: DedupeIndex,
        sink: Arc<dyn ExportSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            processor: Processor {
                queue,
                dedupe,
                sink,
                clock,
                stats: Arc::new(Mutex::new(WorkerStats::default())),
            },
            poll_interval: Duration::from_secs(1),
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Sets the poll interval for queue checking.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.processor
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Processes every job that is due now. Returns how many were attempted.
    pub async fn run_once(&self) -> EngineResult<usize> {
        self.processor.run_once().await
    }

    /// Starts the background worker.
    ///
    /// Store errors are logged and the loop carries on at the next tick.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let processor = self.processor.clone();
        let poll_interval = self.poll_interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match processor.run_once().await {
                            Ok(0) => {}
                            Ok(n) => debug!("Export worker handled {} jobs", n),
                            Err(e) => warn!("Export worker pass failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Export worker shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Signals the worker to shut down.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

impl std::fmt::Debug for ExportWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportWorker")
            .field("poll_interval", &self.poll_interval)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
