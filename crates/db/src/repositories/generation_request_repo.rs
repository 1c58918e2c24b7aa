//! Repository for the `generation_requests` table.
//!
//! Worker-side writes are keyed by `id` alone; user-facing reads are
//! keyed by `id AND user_id` so one user can never observe another's
//! requests.

use sqlx::{PgConnection, PgPool};
use stillpoint_core::types::DbId;

use crate::models::generation_request::{GenerationRequest, NewGenerationRequest};
use crate::models::status::RequestStatus;

/// Column list for `generation_requests` queries.
const COLUMNS: &str = "\
    id, user_id, visual_prompt, script_type_id, script_content, \
    duration_seconds, ambient_sound_id, music_track_id, visibility_id, \
    credits_charged, status_id, progress, error_message, video_id, \
    created_at, updated_at";

/// Maximum page size for request listing.
const MAX_LIMIT: i64 = 50;

/// Default page size for request listing.
const DEFAULT_LIMIT: i64 = 20;

/// CRUD and stage-transition queries for generation requests.
pub struct GenerationRequestRepo;

impl GenerationRequestRepo {
    /// Insert a new request in `pending` status with zero progress.
    ///
    /// Takes a connection so the submission service can run this inside
    /// the same transaction as the credit reservation.
    pub async fn create(
        conn: &mut PgConnection,
        input: &NewGenerationRequest,
    ) -> Result<GenerationRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_requests \
                 (user_id, visual_prompt, script_type_id, script_content, \
                  duration_seconds, ambient_sound_id, music_track_id, \
                  visibility_id, credits_charged, status_id, progress) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(input.user_id)
            .bind(&input.visual_prompt)
            .bind(input.script_type_id.id())
            .bind(&input.script_content)
            .bind(input.duration_seconds)
            .bind(input.ambient_sound_id)
            .bind(input.music_track_id)
            .bind(input.visibility_id.id())
            .bind(input.credits_charged)
            .bind(RequestStatus::Pending.id())
            .fetch_one(conn)
            .await
    }

    /// Find a request by its ID (worker path).
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_requests WHERE id = $1");
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a request by ID, scoped to its owner (API path).
    pub async fn find_by_id_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<GenerationRequest>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM generation_requests WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's requests, newest first, with the total row count.
    ///
    /// `page` is 1-based and clamped to >= 1; `limit` is clamped to
    /// 1..=[`MAX_LIMIT`] with [`DEFAULT_LIMIT`] for zero/absent values.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<GenerationRequest>, i64), sqlx::Error> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = (page - 1) * limit;

        let query = format!(
            "SELECT {COLUMNS} FROM generation_requests \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, GenerationRequest>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM generation_requests WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok((rows, total))
    }

    /// Move a request to a pipeline stage with its progress floor.
    ///
    /// Progress is written as `GREATEST(progress, $new)`, so observed
    /// progress can never decrease even if a retried attempt replays an
    /// earlier stage.
    pub async fn update_stage(
        pool: &PgPool,
        id: DbId,
        status: RequestStatus,
        progress: i16,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, progress = GREATEST(progress, $3), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.id())
        .bind(progress)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist the generated (or templated) script text.
    pub async fn set_script_content(
        pool: &PgPool,
        id: DbId,
        script: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests SET script_content = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(script)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal success: link the published video, progress 100.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        video_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, progress = 100, video_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(RequestStatus::Completed.id())
        .bind(video_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal failure: record the error, freeze progress where it was.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE generation_requests \
             SET status_id = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(RequestStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// IDs of requests still `pending` after the grace interval.
    ///
    /// Feeds the requeue sweeper: a request whose enqueue was lost after
    /// commit is recoverable from its committed row alone.
    pub async fn stale_pending(
        pool: &PgPool,
        grace: std::time::Duration,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM generation_requests \
             WHERE status_id = $1 AND created_at < NOW() - make_interval(secs => $2) \
             ORDER BY created_at ASC",
        )
        .bind(RequestStatus::Pending.id())
        .bind(grace.as_secs_f64())
        .fetch_all(pool)
        .await
    }
}
