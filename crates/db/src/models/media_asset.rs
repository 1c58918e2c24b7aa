//! Media catalog entity model (ambient sounds and music tracks).

use sqlx::FromRow;
use stillpoint_core::types::{DbId, Timestamp};

/// A row from the `media_assets` table.
#[derive(Debug, Clone, FromRow)]
pub struct MediaAsset {
    pub id: DbId,
    /// See [`super::status::MediaAssetKind`].
    pub kind_id: i16,
    pub title: String,
    pub storage_key: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
