//! Claim loop: pulls jobs from the durable queue and runs the pipeline
//! on them, bounded by a concurrency cap and a starts-per-minute
//! window.
//!
//! Terminal-failure bookkeeping lives here, not in the pipeline: a
//! request is marked `failed` only when the queue reports the job's
//! attempts are exhausted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use stillpoint_core::pipeline::{DEFAULT_STARTS_PER_MINUTE, StartWindow};
use stillpoint_db::repositories::GenerationRequestRepo;
use stillpoint_db::DbPool;
use stillpoint_queue::{ClaimedJob, FailOutcome, JobQueue};
use stillpoint_storage::{keys, BlobStore};

use crate::pipeline::Pipeline;

/// How often the claim loop looks for work.
const CLAIM_TICK: Duration = Duration::from_secs(1);

/// How often a running job's lease is pushed forward.
const LEASE_EXTEND_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of jobs one worker process runs in parallel.
const DEFAULT_CONCURRENCY: usize = 2;

/// Runner tuning knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Max jobs in flight in this process.
    pub concurrency: usize,
    /// Global cap on job starts per minute in this process.
    pub starts_per_minute: u32,
    /// Tag recorded on claimed jobs (diagnostics).
    pub worker_tag: String,
}

impl RunnerConfig {
    /// Load from `WORKER_CONCURRENCY` / `WORKER_STARTS_PER_MINUTE`,
    /// tagging the worker with hostname + pid.
    pub fn from_env() -> Self {
        let concurrency = std::env::var("WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);
        let starts_per_minute = std::env::var("WORKER_STARTS_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STARTS_PER_MINUTE);
        let worker_tag = format!(
            "{}-{}",
            std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".into()),
            std::process::id()
        );
        Self {
            concurrency,
            starts_per_minute,
            worker_tag,
        }
    }
}

/// The worker's claim loop.
pub struct Runner {
    pool: DbPool,
    queue: JobQueue,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn BlobStore>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        pool: DbPool,
        queue: JobQueue,
        pipeline: Pipeline,
        store: Arc<dyn BlobStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            pipeline: Arc::new(pipeline),
            store,
            config,
        }
    }

    /// Run until the cancellation token fires. In-flight jobs finish on
    /// their own tasks; new claims stop immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut window = StartWindow::per_minute(self.config.starts_per_minute);
        let epoch = Instant::now();
        let mut ticker = tokio::time::interval(CLAIM_TICK);

        tracing::info!(
            concurrency = self.config.concurrency,
            starts_per_minute = self.config.starts_per_minute,
            worker_tag = %self.config.worker_tag,
            "Worker runner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker runner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.claim_cycle(&permits, &mut window, epoch).await;
                }
            }
        }
    }

    /// One tick: claim as many jobs as permits and the rate window
    /// allow, spawning a task per job.
    async fn claim_cycle(
        &self,
        permits: &Arc<Semaphore>,
        window: &mut StartWindow,
        epoch: Instant,
    ) {
        loop {
            if !window.has_capacity(epoch.elapsed()) {
                return;
            }
            let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
                return;
            };

            let job = match self.queue.claim(&self.config.worker_tag).await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Job claim failed");
                    return;
                }
            };

            window.try_start(epoch.elapsed());
            let pool = self.pool.clone();
            let queue = self.queue.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                process_job(pool, queue, pipeline, store, job).await;
                drop(permit);
            });
        }
    }
}

/// Run one claimed job to a queue verdict.
///
/// Public so integration tests can drive claimed jobs without the
/// ticker loop around them.
pub async fn process_job(
    pool: DbPool,
    queue: JobQueue,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn BlobStore>,
    job: ClaimedJob,
) {
    let request_id = job.generation_request_id;
    tracing::info!(
        request_id,
        attempt = job.attempts_made,
        max_attempts = job.max_attempts,
        "Job attempt starting",
    );

    // Keep the lease alive while the pipeline runs; a video that takes
    // the full poll budget outlives the initial lease otherwise.
    let keepalive_cancel = CancellationToken::new();
    let keepalive = tokio::spawn(lease_keepalive(
        queue.clone(),
        request_id,
        keepalive_cancel.clone(),
    ));

    let result = pipeline.run(request_id).await;
    keepalive_cancel.cancel();
    let _ = keepalive.await;

    match result {
        Ok(()) => {
            if let Err(e) = queue.complete(request_id).await {
                tracing::error!(request_id, error = %e, "Failed to mark job completed");
            }
        }
        Err(pipeline_err) => {
            let message = pipeline_err.to_string();
            tracing::warn!(
                request_id,
                attempt = job.attempts_made,
                error = %message,
                "Job attempt failed",
            );

            match queue.fail(request_id, &message).await {
                Ok(FailOutcome::RetryScheduled) => {}
                Ok(FailOutcome::Exhausted) => {
                    // Attempts are spent: this is the single place the
                    // request goes terminal. Progress stays frozen.
                    if let Err(e) =
                        GenerationRequestRepo::mark_failed(&pool, request_id, &message).await
                    {
                        tracing::error!(
                            request_id,
                            error = %e,
                            "Failed to mark request as failed",
                        );
                    }

                    // The request will never publish; drop its stage-3
                    // intermediate instead of leaving an orphan.
                    if let Err(e) = store.delete(&keys::voiceover_key(request_id)).await {
                        tracing::warn!(
                            request_id,
                            error = %e,
                            "Failed to remove orphaned voiceover",
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(request_id, error = %e, "Failed to record job failure");
                }
            }
        }
    }
}

/// Periodically extend the job lease until cancelled.
async fn lease_keepalive(queue: JobQueue, request_id: i64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(LEASE_EXTEND_INTERVAL);
    interval.tick().await; // the first tick fires immediately
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = queue.extend_lease(request_id).await {
                    tracing::warn!(request_id, error = %e, "Failed to extend job lease");
                }
            }
        }
    }
}
