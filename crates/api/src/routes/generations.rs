//! Route definitions for the generation endpoints.
//!
//! ```text
//! POST   /                  submit
//! GET    /                  list
//! GET    /{id}/progress     progress
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generations;
use crate::state::AppState;

/// Routes nested under `/api/generations`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generations::submit).get(generations::list))
        .route("/{id}/progress", get(generations::progress))
}
