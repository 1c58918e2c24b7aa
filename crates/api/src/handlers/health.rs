//! Liveness/readiness handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /health
///
/// Verifies database connectivity and reports the running version.
pub async fn health(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    stillpoint_db::health_check(&state.pool).await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
