//! Submission service: validate, price, reserve credits, persist, and
//! enqueue -- the synchronous half of the generation control plane.

use serde::Deserialize;
use stillpoint_core::error::CoreError;
use stillpoint_core::pricing::credits_for;
use stillpoint_core::request::{
    validate_duration, validate_script_content, validate_visual_prompt, ScriptType, Visibility,
};
use stillpoint_core::types::DbId;
use stillpoint_db::models::generation_request::{GenerationRequest, NewGenerationRequest};
use stillpoint_db::models::status::MediaAssetKind;
use stillpoint_db::repositories::{CreditRepo, GenerationRequestRepo, MediaAssetRepo};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /api/generations`.
#[derive(Debug, Deserialize)]
pub struct SubmitGeneration {
    pub visual_prompt: String,
    pub script_type: ScriptType,
    pub script_content: Option<String>,
    pub duration_seconds: i32,
    pub ambient_sound_id: Option<DbId>,
    pub music_track_id: Option<DbId>,
    /// Defaults to public when omitted.
    pub visibility: Option<Visibility>,
}

/// Run the full submission algorithm for one request.
///
/// 1. Validate the input (schema rules plus catalog references).
/// 2. Price the generation.
/// 3. In ONE database transaction: reserve the credits (server-side
///    balance guard) and insert the `pending` request row. Nothing is
///    charged when validation fails, and the guarded update means
///    concurrent submissions cannot overdraw.
/// 4. After commit, enqueue the pipeline job. The committed row is
///    sufficient for recovery: if the enqueue is lost, the requeue
///    sweeper picks the request up later. An enqueue error still marks
///    the request failed best-effort and surfaces a 500 -- the spend
///    stands, matching the no-refund policy.
pub async fn submit(
    state: &AppState,
    user_id: DbId,
    input: SubmitGeneration,
) -> AppResult<GenerationRequest> {
    // -- 1. Validation. Fails before any money moves. --
    validate_visual_prompt(&input.visual_prompt)?;
    validate_duration(input.duration_seconds)?;
    validate_script_content(input.script_type, input.script_content.as_deref())?;

    if let Some(id) = input.ambient_sound_id {
        resolve_asset(state, id, MediaAssetKind::AmbientSound).await?;
    }
    if let Some(id) = input.music_track_id {
        resolve_asset(state, id, MediaAssetKind::MusicTrack).await?;
    }

    // -- 2. Pricing. --
    let visibility = input.visibility.unwrap_or_default();
    let credits_needed = credits_for(input.duration_seconds, visibility)?;
    let description = match visibility {
        Visibility::Private => {
            format!("Video generation ({}s, private)", input.duration_seconds)
        }
        Visibility::Public => format!("Video generation ({}s)", input.duration_seconds),
    };

    // -- 3. Reserve + persist atomically. --
    let mut tx = state.pool.begin().await?;
    CreditRepo::reserve(&mut *tx, user_id, credits_needed, &description).await?;

    let request = GenerationRequestRepo::create(
        &mut *tx,
        &NewGenerationRequest {
            user_id,
            visual_prompt: input.visual_prompt.trim().to_string(),
            script_type_id: input.script_type.into(),
            script_content: input
                .script_content
                .filter(|s| !s.trim().is_empty()),
            duration_seconds: input.duration_seconds,
            ambient_sound_id: input.ambient_sound_id,
            music_track_id: input.music_track_id,
            visibility_id: visibility.into(),
            credits_charged: credits_needed as i32,
        },
    )
    .await?;
    tx.commit().await?;

    // -- 4. Enqueue the pipeline job. --
    if let Err(e) = state.queue.enqueue(request.id).await {
        tracing::error!(
            request_id = request.id,
            error = %e,
            "Failed to enqueue generation job",
        );
        if let Err(mark_err) =
            GenerationRequestRepo::mark_failed(&state.pool, request.id, "Failed to enqueue job")
                .await
        {
            tracing::error!(
                request_id = request.id,
                error = %mark_err,
                "Failed to mark orphaned request as failed",
            );
        }
        return Err(AppError::InternalError(format!(
            "Failed to enqueue generation job: {e}"
        )));
    }

    tracing::info!(
        request_id = request.id,
        user_id,
        credits_charged = credits_needed,
        "Generation request submitted",
    );
    Ok(request)
}

/// Require a catalog asset to exist, be active, and be the right kind.
async fn resolve_asset(
    state: &AppState,
    id: DbId,
    kind: MediaAssetKind,
) -> AppResult<()> {
    let found = MediaAssetRepo::find_active(&state.pool, id, kind).await?;
    if found.is_none() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unknown {} id {id}",
            kind.name()
        ))));
    }
    Ok(())
}
