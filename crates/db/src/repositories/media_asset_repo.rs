//! Read-only access to the media catalog.

use sqlx::PgPool;
use stillpoint_core::types::DbId;

use crate::models::media_asset::MediaAsset;
use crate::models::status::MediaAssetKind;

/// Column list for `media_assets` queries.
const COLUMNS: &str = "id, kind_id, title, storage_key, is_active, created_at, updated_at";

/// Lookups into the catalog owned by the media-asset service.
pub struct MediaAssetRepo;

impl MediaAssetRepo {
    /// Find an active asset of the given kind.
    ///
    /// Returns `None` for unknown ids, inactive assets, and kind
    /// mismatches alike -- callers treat all three as "not usable".
    pub async fn find_active(
        pool: &PgPool,
        id: DbId,
        kind: MediaAssetKind,
    ) -> Result<Option<MediaAsset>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM media_assets \
             WHERE id = $1 AND kind_id = $2 AND is_active = TRUE"
        );
        sqlx::query_as::<_, MediaAsset>(&query)
            .bind(id)
            .bind(kind.id())
            .fetch_optional(pool)
            .await
    }
}
