//! Repository for the `videos` table.

use sqlx::PgPool;
use stillpoint_core::types::DbId;

use crate::models::status::{ModerationStatus, VisibilityId};
use crate::models::video::{NewVideo, Video};

/// Column list for `videos` queries.
const COLUMNS: &str = "\
    id, user_id, title, storage_key, thumbnail_key, duration_seconds, \
    visibility_id, moderation_status_id, visual_prompt, created_at, updated_at";

/// Insert and lookup for published videos.
pub struct VideoRepo;

impl VideoRepo {
    /// Insert a freshly composed video.
    ///
    /// Every new video starts hidden (`pending_review`) with moderation
    /// `pending`; the moderation service owns all later mutations.
    pub async fn insert(pool: &PgPool, input: &NewVideo) -> Result<Video, sqlx::Error> {
        let query = format!(
            "INSERT INTO videos \
                 (user_id, title, storage_key, thumbnail_key, duration_seconds, \
                  visibility_id, moderation_status_id, visual_prompt) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(input.user_id)
            .bind(&input.title)
            .bind(&input.storage_key)
            .bind(&input.thumbnail_key)
            .bind(input.duration_seconds)
            .bind(VisibilityId::PendingReview.id())
            .bind(ModerationStatus::Pending.id())
            .bind(&input.visual_prompt)
            .fetch_one(pool)
            .await
    }

    /// Find a video by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Video>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos WHERE id = $1");
        sqlx::query_as::<_, Video>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
