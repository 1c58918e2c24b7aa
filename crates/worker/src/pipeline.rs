//! The five-stage generation pipeline.
//!
//! One call to [`Pipeline::run`] is one delivery attempt for one
//! request: script -> voice -> video -> compose -> publish. Errors
//! propagate to the caller (the runner), which reports them to the
//! queue; the request is only marked `failed` once the queue says the
//! attempts are spent. Progress writes go through the request store's
//! monotone update, so a replayed stage can never make observed
//! progress move backwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use stillpoint_core::pipeline::{
    video_poll_progress, PROGRESS_COMPOSE_DONE, PROGRESS_COMPOSE_START, PROGRESS_SCRIPT_DONE,
    PROGRESS_SCRIPT_START, PROGRESS_VIDEO_START, PROGRESS_VOICE_DONE, PROGRESS_VOICE_START,
    VIDEO_MAX_POLLS, VIDEO_POLL_INTERVAL,
};
use stillpoint_core::request::title_from_prompt;
use stillpoint_core::types::DbId;
use stillpoint_db::models::generation_request::GenerationRequest;
use stillpoint_db::models::status::{MediaAssetKind, RequestStatus, ScriptTypeId};
use stillpoint_db::models::video::NewVideo;
use stillpoint_db::repositories::{GenerationRequestRepo, MediaAssetRepo, VideoRepo};
use stillpoint_db::DbPool;
use stillpoint_media::{ComposeInputs, MediaComposer, MediaError, Scratch};
use stillpoint_providers::{
    ByteStream, ProviderError, ScriptPort, VideoJobState, VideoPort, VoicePort,
};
use stillpoint_providers::voice::DEFAULT_VOICE_ID;
use stillpoint_storage::keys;
use stillpoint_storage::{BlobStore, StorageError};

/// Errors from one pipeline attempt.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Retrying cannot help (e.g. the request row is gone).
    #[error("{0}")]
    Permanent(String),

    /// The video provider never finished inside the poll budget.
    #[error("{0}")]
    Timeout(String),
}

/// The worker-side pipeline, wired with its collaborators.
///
/// All ports are injected; tests swap in in-memory doubles and a zero
/// poll interval.
pub struct Pipeline {
    pool: DbPool,
    store: Arc<dyn BlobStore>,
    script: Arc<dyn ScriptPort>,
    voice: Arc<dyn VoicePort>,
    video: Arc<dyn VideoPort>,
    composer: Arc<dyn MediaComposer>,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(
        pool: DbPool,
        store: Arc<dyn BlobStore>,
        script: Arc<dyn ScriptPort>,
        voice: Arc<dyn VoicePort>,
        video: Arc<dyn VideoPort>,
        composer: Arc<dyn MediaComposer>,
    ) -> Self {
        Self {
            pool,
            store,
            script,
            voice,
            video,
            composer,
            poll_interval: VIDEO_POLL_INTERVAL,
        }
    }

    /// Override the poll sleep (tests use zero).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one delivery attempt for `request_id`.
    pub async fn run(&self, request_id: DbId) -> Result<(), PipelineError> {
        let request = GenerationRequestRepo::find_by_id(&self.pool, request_id)
            .await?
            .ok_or_else(|| {
                PipelineError::Permanent(format!("Generation request {request_id} not found"))
            })?;

        // A redelivered job for an already-published request is a no-op;
        // the video insert must not happen twice.
        if request.status() == RequestStatus::Completed {
            tracing::info!(request_id, "Request already completed, skipping");
            return Ok(());
        }

        tracing::info!(
            request_id,
            duration_seconds = request.duration_seconds,
            "Pipeline attempt starting",
        );

        // -- Stage 1: script --
        let script = self.script_stage(&request).await?;

        // Stages 2-4 work through a scratch directory that is released
        // no matter how the attempt ends.
        let mut scratch = Scratch::new()?;
        let result = self.run_media_stages(&request, &script, &scratch).await;
        scratch.cleanup();
        result
    }

    /// Stage 1: obtain the meditation script.
    ///
    /// AI-generated requests (and any request that somehow lost its
    /// script) go to the text provider, with the visual prompt doubling
    /// as the thematic hint; user-provided and template scripts are used
    /// as submitted.
    async fn script_stage(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::GeneratingScript,
            PROGRESS_SCRIPT_START,
        )
        .await?;

        let needs_generation = request.script_type_id == ScriptTypeId::AiGenerated.id()
            || request
                .script_content
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);

        let script = if needs_generation {
            let script_type = ScriptTypeId::from_id(request.script_type_id)
                .map(|id| match id {
                    ScriptTypeId::UserProvided => stillpoint_core::request::ScriptType::UserProvided,
                    ScriptTypeId::Template => stillpoint_core::request::ScriptType::Template,
                    ScriptTypeId::AiGenerated => stillpoint_core::request::ScriptType::AiGenerated,
                })
                .unwrap_or(stillpoint_core::request::ScriptType::AiGenerated);

            let generated = self
                .script
                .generate(script_type, request.duration_seconds, &request.visual_prompt)
                .await?;
            GenerationRequestRepo::set_script_content(&self.pool, request.id, &generated).await?;
            generated
        } else {
            request.script_content.clone().unwrap_or_default()
        };

        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::GeneratingScript,
            PROGRESS_SCRIPT_DONE,
        )
        .await?;

        Ok(script)
    }

    /// Stages 2-4: voice, video, compose, publish.
    async fn run_media_stages(
        &self,
        request: &GenerationRequest,
        script: &str,
        scratch: &Scratch,
    ) -> Result<(), PipelineError> {
        // -- Stage 2: voice --
        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::GeneratingVoice,
            PROGRESS_VOICE_START,
        )
        .await?;

        let voiceover_key = keys::voiceover_key(request.id);
        let voice_stream = self.voice.synthesize(script, DEFAULT_VOICE_ID).await?;
        let voiceover_spool = scratch.path("voiceover-upload.mp3");
        spool_stream(voice_stream, &voiceover_spool).await?;
        self.store
            .upload_file(&voiceover_key, &voiceover_spool, keys::CONTENT_TYPE_AUDIO)
            .await?;

        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::GeneratingVoice,
            PROGRESS_VOICE_DONE,
        )
        .await?;

        // -- Stage 3: video --
        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::GeneratingVideo,
            PROGRESS_VIDEO_START,
        )
        .await?;

        let job_id = self
            .video
            .start(&request.visual_prompt, request.duration_seconds)
            .await?;
        self.video_poll_loop(request.id, &job_id).await?;

        // -- Stage 4: compose --
        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::Compositing,
            PROGRESS_COMPOSE_START,
        )
        .await?;

        let source_video = scratch.path("source.mp4");
        spool_stream(self.video.fetch(&job_id).await?, &source_video).await?;

        let voiceover_path = scratch.path("voiceover.mp3");
        self.store.download_to(&voiceover_key, &voiceover_path).await?;

        let ambient = self
            .resolve_bed(request.ambient_sound_id, MediaAssetKind::AmbientSound, scratch, "ambient")
            .await?;
        let music = self
            .resolve_bed(request.music_track_id, MediaAssetKind::MusicTrack, scratch, "music")
            .await?;

        let composed = self
            .composer
            .compose(
                scratch,
                &ComposeInputs {
                    video: source_video,
                    voiceover: voiceover_path,
                    ambient,
                    music,
                },
            )
            .await?;

        GenerationRequestRepo::update_stage(
            &self.pool,
            request.id,
            RequestStatus::Compositing,
            PROGRESS_COMPOSE_DONE,
        )
        .await?;

        // -- Stage 5: publish --
        let video_key = keys::final_video_key(request.id);
        let thumbnail_key = keys::thumbnail_key(request.id);

        // The two uploads have no ordering dependency.
        let (video_upload, thumbnail_upload) = tokio::join!(
            self.store
                .upload_file(&video_key, &composed.video_path, keys::CONTENT_TYPE_VIDEO),
            self.store.upload_file(
                &thumbnail_key,
                &composed.thumbnail_path,
                keys::CONTENT_TYPE_THUMBNAIL
            ),
        );
        video_upload?;
        thumbnail_upload?;

        let video = VideoRepo::insert(
            &self.pool,
            &NewVideo {
                user_id: request.user_id,
                title: title_from_prompt(&request.visual_prompt),
                storage_key: video_key,
                thumbnail_key,
                duration_seconds: composed.duration_seconds.round() as i32,
                visual_prompt: request.visual_prompt.clone(),
            },
        )
        .await?;

        GenerationRequestRepo::mark_completed(&self.pool, request.id, video.id).await?;

        tracing::info!(
            request_id = request.id,
            video_id = video.id,
            "Pipeline completed",
        );
        Ok(())
    }

    /// Poll the video provider until it completes, fails, or the poll
    /// budget runs out. Progress interpolates 40 -> 75 across the loop.
    async fn video_poll_loop(&self, request_id: DbId, job_id: &str) -> Result<(), PipelineError> {
        for polls in 0..VIDEO_MAX_POLLS {
            match self.video.poll(job_id).await? {
                VideoJobState::Completed { .. } => {
                    tracing::info!(request_id, job_id, polls, "Video generation completed");
                    return Ok(());
                }
                VideoJobState::Failed { error } => {
                    return Err(ProviderError::Permanent(format!(
                        "Video generation failed: {error}"
                    ))
                    .into());
                }
                VideoJobState::Processing => {
                    GenerationRequestRepo::update_stage(
                        &self.pool,
                        request_id,
                        RequestStatus::GeneratingVideo,
                        video_poll_progress(polls + 1),
                    )
                    .await?;
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(PipelineError::Timeout(
            "Veo generation timed out after 8 minutes".to_string(),
        ))
    }

    /// Download an optional audio bed from the catalog into the scratch
    /// dir. An asset deactivated since submission is treated as absent.
    async fn resolve_bed(
        &self,
        asset_id: Option<DbId>,
        kind: MediaAssetKind,
        scratch: &Scratch,
        file_stem: &str,
    ) -> Result<Option<std::path::PathBuf>, PipelineError> {
        let Some(asset_id) = asset_id else {
            return Ok(None);
        };

        let Some(asset) = MediaAssetRepo::find_active(&self.pool, asset_id, kind).await? else {
            tracing::warn!(asset_id, kind = kind.name(), "Catalog asset no longer active, skipping bed");
            return Ok(None);
        };

        // A catalog row can outlive its object; probe before downloading
        // so a dangling key degrades the mix instead of failing the job.
        if !self.store.head(&asset.storage_key).await? {
            tracing::warn!(
                asset_id,
                storage_key = %asset.storage_key,
                "Catalog asset object missing from storage, skipping bed",
            );
            return Ok(None);
        }

        let path = scratch.path(&format!("{file_stem}.mp3"));
        self.store.download_to(&asset.storage_key, &path).await?;
        Ok(Some(path))
    }
}

/// Write a provider byte stream to a file, chunk by chunk.
async fn spool_stream(mut stream: ByteStream, path: &Path) -> Result<(), PipelineError> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}
