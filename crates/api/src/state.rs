use std::sync::Arc;

use stillpoint_queue::JobQueue;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: stillpoint_db::DbPool,
    /// Server configuration (middleware and auth read this).
    pub config: Arc<ServerConfig>,
    /// Durable job queue the submission path enqueues into.
    pub queue: JobQueue,
}
