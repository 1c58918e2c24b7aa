//! Route modules. Each returns a `Router<AppState>` merged by
//! [`api_routes`] under the `/api` prefix; health stays at the root.

pub mod generations;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// All routes nested under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/generations", generations::router())
}
