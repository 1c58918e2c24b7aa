//! Durable job queue over the `queue_jobs` table.
//!
//! One job per generation request: the row's primary key IS the request
//! id, so enqueueing twice can never schedule twice. Claims take a
//! lease (`locked_until`); when a worker dies mid-job the lease lapses
//! and the job becomes claimable again, so delivery is at-least-once.
//!
//! Retry policy: `max_attempts` deliveries (default 3) with exponential
//! backoff from a 30-second base. Terminal rows are kept for
//! inspection and purged on a TTL (24 h for completed, 7 days for
//! failed).

use std::time::Duration;

use sqlx::{FromRow, PgPool};
use stillpoint_core::pipeline::{retry_backoff, DEFAULT_MAX_ATTEMPTS};
use stillpoint_core::types::{DbId, Timestamp};

/// Queue job delivery state ids (see `stillpoint_db::models::status::JobStatus`;
/// duplicated as consts here so this crate does not depend on the model
/// crate's full surface).
const STATUS_QUEUED: i16 = 1;
const STATUS_RUNNING: i16 = 2;
const STATUS_COMPLETED: i16 = 3;
const STATUS_FAILED: i16 = 4;

/// How long a claim holds a job before it becomes claimable again.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(15 * 60);

/// Retention for completed jobs.
pub const COMPLETED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Retention for terminally failed jobs.
pub const FAILED_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A job handed to a worker by [`JobQueue::claim`].
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedJob {
    pub generation_request_id: DbId,
    /// Delivery attempts consumed, including this one.
    pub attempts_made: i32,
    pub max_attempts: i32,
}

impl ClaimedJob {
    /// Whether this delivery is the job's last chance.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Outcome of reporting a failure on a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Another delivery is scheduled after backoff.
    RetryScheduled,
    /// All attempts are spent; the job is terminally failed.
    Exhausted,
}

/// Full queue row, exposed for sweepers and tests.
#[derive(Debug, Clone, FromRow)]
pub struct QueueJob {
    pub generation_request_id: DbId,
    pub status_id: i16,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub available_at: Timestamp,
    pub locked_until: Option<Timestamp>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub enqueued_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// Column list for `queue_jobs` queries.
const COLUMNS: &str = "\
    generation_request_id, status_id, attempts_made, max_attempts, \
    available_at, locked_until, locked_by, last_error, enqueued_at, \
    completed_at, updated_at";

/// Handle to the durable queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    lease: Duration,
}

impl JobQueue {
    /// Queue over the given pool with the default lease.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    /// Override the claim lease (tests use short leases).
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Enqueue a job for a generation request.
    ///
    /// Idempotent: the request id is the primary key, so a second
    /// enqueue (user retry, sweeper overlap) is a no-op. Returns
    /// whether a new row was inserted.
    pub async fn enqueue(&self, generation_request_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO queue_jobs (generation_request_id, status_id, max_attempts) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (generation_request_id) DO NOTHING",
        )
        .bind(generation_request_id)
        .bind(STATUS_QUEUED)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::debug!(generation_request_id, "Job enqueued");
        } else {
            tracing::debug!(generation_request_id, "Job already enqueued, skipping");
        }
        Ok(inserted)
    }

    /// Atomically claim the next deliverable job.
    ///
    /// Deliverable means queued-and-due, or running with a lapsed lease
    /// (its worker died). `FOR UPDATE SKIP LOCKED` keeps concurrent
    /// claimers from double-dispatching. Claiming increments
    /// `attempts_made`.
    pub async fn claim(&self, worker_tag: &str) -> Result<Option<ClaimedJob>, sqlx::Error> {
        sqlx::query_as::<_, ClaimedJob>(
            "UPDATE queue_jobs \
             SET status_id = $1, attempts_made = attempts_made + 1, \
                 locked_until = NOW() + make_interval(secs => $2), \
                 locked_by = $3, updated_at = NOW() \
             WHERE generation_request_id = ( \
                 SELECT generation_request_id FROM queue_jobs \
                 WHERE (status_id = $4 AND available_at <= NOW()) \
                    OR (status_id = $1 AND locked_until < NOW()) \
                 ORDER BY available_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING generation_request_id, attempts_made, max_attempts",
        )
        .bind(STATUS_RUNNING)
        .bind(self.lease.as_secs_f64())
        .bind(worker_tag)
        .bind(STATUS_QUEUED)
        .fetch_optional(&self.pool)
        .await
    }

    /// Push a claimed job's lease forward (long-running stages call this
    /// between polls so a slow provider does not look like a dead worker).
    pub async fn extend_lease(&self, generation_request_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE queue_jobs \
             SET locked_until = NOW() + make_interval(secs => $2), updated_at = NOW() \
             WHERE generation_request_id = $1 AND status_id = $3",
        )
        .bind(generation_request_id)
        .bind(self.lease.as_secs_f64())
        .bind(STATUS_RUNNING)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a claimed job as successfully completed.
    pub async fn complete(&self, generation_request_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE queue_jobs \
             SET status_id = $2, completed_at = NOW(), locked_until = NULL, \
                 locked_by = NULL, updated_at = NOW() \
             WHERE generation_request_id = $1",
        )
        .bind(generation_request_id)
        .bind(STATUS_COMPLETED)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Report a failed attempt.
    ///
    /// While attempts remain the job goes back to `queued` with an
    /// exponential-backoff `available_at`; once `attempts_made` reaches
    /// `max_attempts` it is terminally failed. Either way the error is
    /// recorded.
    pub async fn fail(
        &self,
        generation_request_id: DbId,
        error: &str,
    ) -> Result<FailOutcome, sqlx::Error> {
        let (attempts_made, max_attempts): (i32, i32) = sqlx::query_as(
            "SELECT attempts_made, max_attempts FROM queue_jobs \
             WHERE generation_request_id = $1",
        )
        .bind(generation_request_id)
        .fetch_one(&self.pool)
        .await?;

        if attempts_made >= max_attempts {
            sqlx::query(
                "UPDATE queue_jobs \
                 SET status_id = $2, last_error = $3, completed_at = NOW(), \
                     locked_until = NULL, locked_by = NULL, updated_at = NOW() \
                 WHERE generation_request_id = $1",
            )
            .bind(generation_request_id)
            .bind(STATUS_FAILED)
            .bind(error)
            .execute(&self.pool)
            .await?;

            tracing::warn!(
                generation_request_id,
                attempts_made,
                error,
                "Job failed terminally",
            );
            return Ok(FailOutcome::Exhausted);
        }

        let backoff = retry_backoff(attempts_made);
        sqlx::query(
            "UPDATE queue_jobs \
             SET status_id = $2, last_error = $3, \
                 available_at = NOW() + make_interval(secs => $4), \
                 locked_until = NULL, locked_by = NULL, updated_at = NOW() \
             WHERE generation_request_id = $1",
        )
        .bind(generation_request_id)
        .bind(STATUS_QUEUED)
        .bind(error)
        .bind(backoff.as_secs_f64())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            generation_request_id,
            attempts_made,
            backoff_secs = backoff.as_secs(),
            error,
            "Job failed, retry scheduled",
        );
        Ok(FailOutcome::RetryScheduled)
    }

    /// Delete terminal rows past their retention window. Returns
    /// (completed purged, failed purged).
    pub async fn purge_expired(&self) -> Result<(u64, u64), sqlx::Error> {
        let completed = sqlx::query(
            "DELETE FROM queue_jobs \
             WHERE status_id = $1 AND completed_at < NOW() - make_interval(secs => $2)",
        )
        .bind(STATUS_COMPLETED)
        .bind(COMPLETED_TTL.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let failed = sqlx::query(
            "DELETE FROM queue_jobs \
             WHERE status_id = $1 AND completed_at < NOW() - make_interval(secs => $2)",
        )
        .bind(STATUS_FAILED)
        .bind(FAILED_TTL.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((completed, failed))
    }

    /// Fetch the full queue row for a request (sweepers, tests).
    pub async fn find(
        &self,
        generation_request_id: DbId,
    ) -> Result<Option<QueueJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_jobs WHERE generation_request_id = $1");
        sqlx::query_as::<_, QueueJob>(&query)
            .bind(generation_request_id)
            .fetch_optional(&self.pool)
            .await
    }
}
