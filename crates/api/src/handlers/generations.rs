//! Handlers for the generation endpoints.
//!
//! Routes:
//! - `POST /api/generations`                -- submit a request
//! - `GET  /api/generations`                -- list own requests
//! - `GET  /api/generations/{id}/progress`  -- owner-scoped progress

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use stillpoint_core::error::CoreError;
use stillpoint_core::types::DbId;
use stillpoint_db::models::generation_request::{
    GenerationRequestResponse, ProgressSnapshot,
};
use stillpoint_db::repositories::GenerationRequestRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::query::PageParams;
use crate::response::{DataResponse, PaginatedResponse};
use crate::state::AppState;
use crate::submission::{self, SubmitGeneration};

/// POST /api/generations
///
/// Validates, reserves credits, persists the request, and enqueues the
/// pipeline job. Returns 201 with the created request.
pub async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<SubmitGeneration>,
) -> AppResult<impl IntoResponse> {
    let request = submission::submit(&state, user.user_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: GenerationRequestResponse::from(&request),
        }),
    ))
}

/// GET /api/generations?page=&limit=
///
/// Lists the caller's own requests, newest first.
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<impl IntoResponse> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 50);

    let (rows, total) =
        GenerationRequestRepo::list_by_user(&state.pool, user.user_id, Some(page), Some(limit))
            .await?;

    Ok(Json(PaginatedResponse {
        data: rows.iter().map(GenerationRequestResponse::from).collect(),
        page,
        limit,
        total,
    }))
}

/// GET /api/generations/{id}/progress
///
/// Owner-scoped progress snapshot. Requests owned by other users are
/// indistinguishable from missing ones (404).
pub async fn progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let request = GenerationRequestRepo::find_by_id_for_user(&state.pool, id, user.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "GenerationRequest",
            id,
        }))?;

    Ok(Json(DataResponse {
        data: ProgressSnapshot::from(&request),
    }))
}
