//! Video entity model.
//!
//! Rows are inserted exactly once, at the tail of a successful pipeline.
//! Moderation mutates them afterwards; nothing in this workspace does.

use sqlx::FromRow;
use stillpoint_core::types::{DbId, Timestamp};

/// A row from the `videos` table.
#[derive(Debug, Clone, FromRow)]
pub struct Video {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    pub storage_key: String,
    pub thumbnail_key: String,
    pub duration_seconds: i32,
    /// Always `pending_review` at insert; moderation flips it later.
    pub visibility_id: i16,
    pub moderation_status_id: i16,
    pub visual_prompt: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Values for a new `videos` row.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub user_id: DbId,
    pub title: String,
    pub storage_key: String,
    pub thumbnail_key: String,
    pub duration_seconds: i32,
    pub visual_prompt: String,
}
