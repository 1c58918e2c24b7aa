//! Generation request entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use stillpoint_core::types::{DbId, Timestamp};

use super::status::{RequestStatus, ScriptTypeId, VisibilityId};

/// A row from the `generation_requests` table.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRequest {
    pub id: DbId,
    pub user_id: DbId,
    pub visual_prompt: String,
    pub script_type_id: i16,
    pub script_content: Option<String>,
    pub duration_seconds: i32,
    pub ambient_sound_id: Option<DbId>,
    pub music_track_id: Option<DbId>,
    pub visibility_id: i16,
    pub credits_charged: i32,
    pub status_id: i16,
    pub progress: i16,
    pub error_message: Option<String>,
    pub video_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationRequest {
    /// Typed view of the status column.
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_id(self.status_id).unwrap_or(RequestStatus::Failed)
    }
}

/// Values for a new `generation_requests` row. `credits_charged` is
/// written once here and never updated (the ledger row is its receipt).
#[derive(Debug, Clone)]
pub struct NewGenerationRequest {
    pub user_id: DbId,
    pub visual_prompt: String,
    pub script_type_id: ScriptTypeId,
    pub script_content: Option<String>,
    pub duration_seconds: i32,
    pub ambient_sound_id: Option<DbId>,
    pub music_track_id: Option<DbId>,
    pub visibility_id: VisibilityId,
    pub credits_charged: i32,
}

/// API representation of a request; status ids are resolved to names.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequestResponse {
    pub id: DbId,
    pub visual_prompt: String,
    pub script_type: &'static str,
    pub duration_seconds: i32,
    pub ambient_sound_id: Option<DbId>,
    pub music_track_id: Option<DbId>,
    pub visibility: &'static str,
    pub credits_charged: i32,
    pub status: &'static str,
    pub progress: i16,
    pub video_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&GenerationRequest> for GenerationRequestResponse {
    fn from(row: &GenerationRequest) -> Self {
        Self {
            id: row.id,
            visual_prompt: row.visual_prompt.clone(),
            script_type: ScriptTypeId::from_id(row.script_type_id)
                .map(ScriptTypeId::name)
                .unwrap_or("ai_generated"),
            duration_seconds: row.duration_seconds,
            ambient_sound_id: row.ambient_sound_id,
            music_track_id: row.music_track_id,
            visibility: VisibilityId::from_id(row.visibility_id)
                .map(VisibilityId::name)
                .unwrap_or("public"),
            credits_charged: row.credits_charged,
            status: row.status().name(),
            progress: row.progress,
            video_id: row.video_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Payload for the owner-scoped progress endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub id: DbId,
    pub status: &'static str,
    pub progress: i16,
    pub video_id: Option<DbId>,
}

impl From<&GenerationRequest> for ProgressSnapshot {
    fn from(row: &GenerationRequest) -> Self {
        Self {
            id: row.id,
            status: row.status().name(),
            progress: row.progress,
            video_id: row.video_id,
        }
    }
}
