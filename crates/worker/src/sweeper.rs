//! Background maintenance loops.
//!
//! - Requeue sweeper: requests still `pending` past a grace interval
//!   lost their enqueue (crash between commit and queue push); their
//!   committed row is enough to recover, and enqueue is idempotent so
//!   overlap with a live job is harmless.
//! - Purge sweeper: deletes terminal queue rows past their retention.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stillpoint_db::repositories::GenerationRequestRepo;
use stillpoint_db::DbPool;
use stillpoint_queue::JobQueue;

/// How long a request may sit `pending` before the sweeper re-enqueues it.
const DEFAULT_REQUEUE_GRACE: Duration = Duration::from_secs(10 * 60);

/// How often the requeue sweeper runs.
const REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// How often terminal queue rows are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the pending-requeue loop until cancelled.
pub async fn run_requeue(pool: DbPool, queue: JobQueue, cancel: CancellationToken) {
    let grace: Duration = std::env::var("REQUEUE_GRACE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEUE_GRACE);

    tracing::info!(
        grace_secs = grace.as_secs(),
        interval_secs = REQUEUE_INTERVAL.as_secs(),
        "Requeue sweeper started",
    );

    let mut interval = tokio::time::interval(REQUEUE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Requeue sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match GenerationRequestRepo::stale_pending(&pool, grace).await {
                    Ok(stale) => {
                        for request_id in stale {
                            match queue.enqueue(request_id).await {
                                Ok(true) => {
                                    tracing::info!(request_id, "Requeued stale pending request");
                                }
                                Ok(false) => {
                                    tracing::debug!(request_id, "Stale request already queued");
                                }
                                Err(e) => {
                                    tracing::error!(request_id, error = %e, "Requeue failed");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stale-pending scan failed");
                    }
                }
            }
        }
    }
}

/// Run the queue TTL purge loop until cancelled.
pub async fn run_purge(queue: JobQueue, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = PURGE_INTERVAL.as_secs(),
        "Queue purge sweeper started",
    );

    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Queue purge sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match queue.purge_expired().await {
                    Ok((completed, failed)) => {
                        if completed > 0 || failed > 0 {
                            tracing::info!(completed, failed, "Purged expired queue jobs");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Queue purge failed");
                    }
                }
            }
        }
    }
}
