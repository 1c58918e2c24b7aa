//! Pipeline integration tests with in-memory provider, storage, and
//! composer doubles. The database is real (sqlx test pool); everything
//! that would leave the process is faked.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use sqlx::PgPool;
use stillpoint_core::request::ScriptType;
use stillpoint_db::models::generation_request::NewGenerationRequest;
use stillpoint_db::models::status::{
    MediaAssetKind, RequestStatus, ScriptTypeId, VisibilityId,
};
use stillpoint_db::repositories::{CreditRepo, GenerationRequestRepo, UserRepo};
use stillpoint_media::{ComposeInputs, ComposedMedia, MediaComposer, MediaError, Scratch};
use stillpoint_providers::{
    ByteStream, ProviderError, ScriptPort, VideoJobState, VideoPort, VoicePort,
};
use stillpoint_queue::JobQueue;
use stillpoint_storage::{BlobStore, StorageError};
use stillpoint_worker::{process_job, Pipeline, PipelineError};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeScript {
    called: AtomicBool,
}

#[async_trait::async_trait]
impl ScriptPort for FakeScript {
    async fn generate(
        &self,
        _script_type: ScriptType,
        duration_seconds: i32,
        theme: &str,
    ) -> Result<String, ProviderError> {
        self.called.store(true, Ordering::SeqCst);
        Ok(format!(
            "Settle in and picture {theme} for {duration_seconds} seconds. Breathe."
        ))
    }
}

#[derive(Default)]
struct FakeVoice;

#[async_trait::async_trait]
impl VoicePort for FakeVoice {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<ByteStream, ProviderError> {
        let chunks = vec![
            Ok(bytes::Bytes::from_static(b"ID3voice-")),
            Ok(bytes::Bytes::from_static(b"bytes")),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

enum VideoBehavior {
    /// Reports `processing` this many times, then `completed`.
    CompleteAfter(u32),
    /// Never finishes.
    AlwaysProcessing,
    /// Terminal provider-side failure.
    FailWith(&'static str),
}

struct FakeVideo {
    behavior: VideoBehavior,
    polls: AtomicU32,
}

impl FakeVideo {
    fn new(behavior: VideoBehavior) -> Self {
        Self {
            behavior,
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl VideoPort for FakeVideo {
    async fn start(&self, _prompt: &str, _duration_seconds: i32) -> Result<String, ProviderError> {
        Ok("veo-job-1".to_string())
    }

    async fn poll(&self, _job_id: &str) -> Result<VideoJobState, ProviderError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            VideoBehavior::CompleteAfter(n) if polls >= *n => Ok(VideoJobState::Completed {
                download_uri: "https://video.example/veo-job-1".to_string(),
            }),
            VideoBehavior::CompleteAfter(_) | VideoBehavior::AlwaysProcessing => {
                Ok(VideoJobState::Processing)
            }
            VideoBehavior::FailWith(error) => Ok(VideoJobState::Failed {
                error: error.to_string(),
            }),
        }
    }

    async fn fetch(&self, _job_id: &str) -> Result<ByteStream, ProviderError> {
        Ok(Box::pin(stream::iter(vec![Ok(bytes::Bytes::from_static(
            b"raw-video-bytes",
        ))])))
    }
}

/// In-memory blob store backed by a key -> bytes map.
#[derive(Default, Clone)]
struct FakeStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FakeStore {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn put(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }
}

#[async_trait::async_trait]
impl BlobStore for FakeStore {
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let bytes = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Request(format!("GetObject {key} failed: no such key")))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Composer double: fabricates output files and records which beds it
/// was given.
#[derive(Default)]
struct FakeComposer {
    saw_ambient: AtomicBool,
    saw_music: AtomicBool,
}

#[async_trait::async_trait]
impl MediaComposer for FakeComposer {
    async fn compose(
        &self,
        scratch: &Scratch,
        inputs: &ComposeInputs,
    ) -> Result<ComposedMedia, MediaError> {
        self.saw_ambient
            .store(inputs.ambient.is_some(), Ordering::SeqCst);
        self.saw_music
            .store(inputs.music.is_some(), Ordering::SeqCst);

        let video_path = scratch.path("final.mp4");
        let thumbnail_path = scratch.path("thumbnail.jpg");
        std::fs::write(&video_path, b"composed-video")?;
        std::fs::write(&thumbnail_path, b"jpeg-thumbnail")?;
        Ok(ComposedMedia {
            video_path,
            thumbnail_path,
            duration_seconds: 60.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: FakeStore,
    script: Arc<FakeScript>,
    composer: Arc<FakeComposer>,
    pipeline: Arc<Pipeline>,
}

fn build_harness(pool: PgPool, video: FakeVideo) -> Harness {
    let store = FakeStore::default();
    let script = Arc::new(FakeScript::default());
    let composer = Arc::new(FakeComposer::default());
    let pipeline = Pipeline::new(
        pool.clone(),
        Arc::new(store.clone()),
        Arc::clone(&script) as Arc<dyn ScriptPort>,
        Arc::new(FakeVoice),
        Arc::new(video),
        Arc::clone(&composer) as Arc<dyn MediaComposer>,
    )
    .with_poll_interval(Duration::ZERO);

    Harness {
        store,
        script,
        composer,
        pipeline: Arc::new(pipeline),
    }
}

async fn seed_request(
    pool: &PgPool,
    email: &str,
    script_type: ScriptTypeId,
    script_content: Option<&str>,
) -> (i64, i64) {
    let user = UserRepo::create(pool, email, 1, 100).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    CreditRepo::reserve(&mut *tx, user.id, 5, "Video generation (60s)")
        .await
        .unwrap();
    let request = GenerationRequestRepo::create(
        &mut *tx,
        &NewGenerationRequest {
            user_id: user.id,
            visual_prompt: "A peaceful mountain scene".to_string(),
            script_type_id: script_type,
            script_content: script_content.map(str::to_string),
            duration_seconds: 60,
            ambient_sound_id: None,
            music_track_id: None,
            visibility_id: VisibilityId::Public,
            credits_charged: 5,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    (user.id, request.id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Happy path: the request ends completed at 100 with a linked video in
/// pending review, all three artifacts in storage, and the generated
/// script persisted.
#[sqlx::test(migrations = "../db/migrations")]
async fn happy_path_publishes_video(pool: PgPool) {
    let (user_id, request_id) =
        seed_request(&pool, "happy@test.com", ScriptTypeId::AiGenerated, None).await;
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(3)));

    h.pipeline.run(request_id).await.unwrap();

    let request = GenerationRequestRepo::find_by_id(&pool, request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status(), RequestStatus::Completed);
    assert_eq!(request.progress, 100);
    let video_id = request.video_id.expect("completed request links a video");
    assert!(request
        .script_content
        .unwrap()
        .contains("A peaceful mountain scene"));

    let video = stillpoint_db::repositories::VideoRepo::find_by_id(&pool, video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(video.user_id, user_id);
    assert_eq!(video.visibility_id, VisibilityId::PendingReview.id());
    assert_eq!(video.duration_seconds, 60);
    assert_eq!(video.storage_key, format!("videos/{request_id}/final.mp4"));

    assert_eq!(
        h.store.keys(),
        vec![
            format!("generations/{request_id}/voiceover.mp3"),
            format!("videos/{request_id}/final.mp4"),
            format!("videos/{request_id}/thumbnail.jpg"),
        ]
    );
    assert!(h.script.called.load(Ordering::SeqCst));
}

/// A user-provided script is used verbatim; the script provider is
/// never called.
#[sqlx::test(migrations = "../db/migrations")]
async fn user_script_skips_generation(pool: PgPool) {
    let (_user_id, request_id) = seed_request(
        &pool,
        "userscript@test.com",
        ScriptTypeId::UserProvided,
        Some("Close your eyes. Breathe in, and out."),
    )
    .await;
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(0)));

    h.pipeline.run(request_id).await.unwrap();

    assert!(!h.script.called.load(Ordering::SeqCst));
    let request = GenerationRequestRepo::find_by_id(&pool, request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        request.script_content.as_deref(),
        Some("Close your eyes. Breathe in, and out.")
    );
}

/// A provider-side failure surfaces as a permanent provider error; the
/// pipeline itself never marks the request failed (that is the queue
/// exhaustion hook's job).
#[sqlx::test(migrations = "../db/migrations")]
async fn video_failure_propagates(pool: PgPool) {
    let (_user_id, request_id) = seed_request(
        &pool,
        "vidfail@test.com",
        ScriptTypeId::AiGenerated,
        None,
    )
    .await;
    let h = build_harness(
        pool.clone(),
        FakeVideo::new(VideoBehavior::FailWith("content policy violation")),
    );

    let err = h.pipeline.run(request_id).await.unwrap_err();
    match err {
        PipelineError::Provider(ProviderError::Permanent(msg)) => {
            assert!(msg.contains("content policy violation"));
        }
        other => panic!("expected permanent provider error, got {other:?}"),
    }

    let request = GenerationRequestRepo::find_by_id(&pool, request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status(), RequestStatus::GeneratingVideo);
    assert!(request.video_id.is_none());
}

/// A provider that never completes exhausts the 48-poll budget and
/// raises the timeout; progress is capped at 75.
#[sqlx::test(migrations = "../db/migrations")]
async fn video_timeout_after_max_polls(pool: PgPool) {
    let (_user_id, request_id) = seed_request(
        &pool,
        "timeout@test.com",
        ScriptTypeId::AiGenerated,
        None,
    )
    .await;
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::AlwaysProcessing));

    let err = h.pipeline.run(request_id).await.unwrap_err();
    match err {
        PipelineError::Timeout(msg) => {
            assert_eq!(msg, "Veo generation timed out after 8 minutes");
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    let request = GenerationRequestRepo::find_by_id(&pool, request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status(), RequestStatus::GeneratingVideo);
    assert_eq!(request.progress, 75, "progress is capped during polling");
}

/// Scenario: the provider hangs, the queue retries, and only the final
/// exhausted attempt marks the request failed. Credits stay spent.
#[sqlx::test(migrations = "../db/migrations")]
async fn exhausted_retries_mark_request_failed(pool: PgPool) {
    let (user_id, request_id) = seed_request(
        &pool,
        "exhaust@test.com",
        ScriptTypeId::AiGenerated,
        None,
    )
    .await;
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::AlwaysProcessing));
    let queue = JobQueue::new(pool.clone());
    queue.enqueue(request_id).await.unwrap();

    for attempt in 1..=3 {
        // Force the backoff to elapse so the next claim succeeds.
        sqlx::query("UPDATE queue_jobs SET available_at = NOW() WHERE generation_request_id = $1")
            .bind(request_id)
            .execute(&pool)
            .await
            .unwrap();

        let job = queue.claim("test-worker").await.unwrap().unwrap();
        assert_eq!(job.attempts_made, attempt);
        process_job(
            pool.clone(),
            queue.clone(),
            Arc::clone(&h.pipeline),
            Arc::new(h.store.clone()),
            job,
        )
        .await;

        let request = GenerationRequestRepo::find_by_id(&pool, request_id)
            .await
            .unwrap()
            .unwrap();
        let voiceover_uploaded = h
            .store
            .keys()
            .contains(&format!("generations/{request_id}/voiceover.mp3"));
        if attempt < 3 {
            assert_ne!(
                request.status(),
                RequestStatus::Failed,
                "request must not fail before attempts are exhausted"
            );
            assert!(voiceover_uploaded, "intermediate survives while retries remain");
        } else {
            assert_eq!(request.status(), RequestStatus::Failed);
            assert!(request.video_id.is_none());
            assert_eq!(
                request.error_message.as_deref(),
                Some("Veo generation timed out after 8 minutes")
            );
            assert!(
                !voiceover_uploaded,
                "terminal failure removes the orphaned voiceover"
            );
        }
    }

    // Spent credits stay spent: no refund on terminal failure.
    assert_eq!(CreditRepo::balance_of(&pool, user_id).await.unwrap(), 95);
}

/// A redelivered job for an already-completed request is a no-op.
#[sqlx::test(migrations = "../db/migrations")]
async fn completed_request_is_not_rerun(pool: PgPool) {
    let (_user_id, request_id) = seed_request(
        &pool,
        "rerun@test.com",
        ScriptTypeId::AiGenerated,
        None,
    )
    .await;
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(0)));

    h.pipeline.run(request_id).await.unwrap();
    let videos_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
        .fetch_one(&pool)
        .await
        .unwrap();

    // Redelivery (e.g. a lapsed lease after success).
    h.pipeline.run(request_id).await.unwrap();

    let videos_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(videos_before, 1);
    assert_eq!(videos_after, 1, "the video insert must not repeat");
}

/// Ambient and music beds are resolved from the catalog, downloaded
/// from storage, and handed to the composer.
#[sqlx::test(migrations = "../db/migrations")]
async fn audio_beds_reach_the_composer(pool: PgPool) {
    let user = UserRepo::create(&pool, "beds@test.com", 1, 100).await.unwrap();

    let ambient_id: i64 = sqlx::query_scalar(
        "INSERT INTO media_assets (kind_id, title, storage_key) \
         VALUES ($1, 'Rain', 'assets/ambient/rain.mp3') RETURNING id",
    )
    .bind(MediaAssetKind::AmbientSound.id())
    .fetch_one(&pool)
    .await
    .unwrap();
    let music_id: i64 = sqlx::query_scalar(
        "INSERT INTO media_assets (kind_id, title, storage_key) \
         VALUES ($1, 'Piano', 'assets/music/piano.mp3') RETURNING id",
    )
    .bind(MediaAssetKind::MusicTrack.id())
    .fetch_one(&pool)
    .await
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let request = GenerationRequestRepo::create(
        &mut *conn,
        &NewGenerationRequest {
            user_id: user.id,
            visual_prompt: "A rainy window".to_string(),
            script_type_id: ScriptTypeId::AiGenerated,
            script_content: None,
            duration_seconds: 120,
            ambient_sound_id: Some(ambient_id),
            music_track_id: Some(music_id),
            visibility_id: VisibilityId::Public,
            credits_charged: 8,
        },
    )
    .await
    .unwrap();
    drop(conn);

    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(1)));
    h.store.put("assets/ambient/rain.mp3", b"rain-loop");
    h.store.put("assets/music/piano.mp3", b"piano-loop");

    h.pipeline.run(request.id).await.unwrap();

    assert!(h.composer.saw_ambient.load(Ordering::SeqCst));
    assert!(h.composer.saw_music.load(Ordering::SeqCst));
}

/// A catalog row whose storage object is gone degrades to a mix without
/// that bed instead of failing the pipeline.
#[sqlx::test(migrations = "../db/migrations")]
async fn missing_bed_object_is_skipped(pool: PgPool) {
    let user = UserRepo::create(&pool, "nobed@test.com", 1, 100).await.unwrap();

    let ambient_id: i64 = sqlx::query_scalar(
        "INSERT INTO media_assets (kind_id, title, storage_key) \
         VALUES ($1, 'Wind', 'assets/ambient/wind.mp3') RETURNING id",
    )
    .bind(MediaAssetKind::AmbientSound.id())
    .fetch_one(&pool)
    .await
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let request = GenerationRequestRepo::create(
        &mut *conn,
        &NewGenerationRequest {
            user_id: user.id,
            visual_prompt: "Dunes at dusk".to_string(),
            script_type_id: ScriptTypeId::AiGenerated,
            script_content: None,
            duration_seconds: 60,
            ambient_sound_id: Some(ambient_id),
            music_track_id: None,
            visibility_id: VisibilityId::Public,
            credits_charged: 5,
        },
    )
    .await
    .unwrap();
    drop(conn);

    // The catalog row exists but its object was never written.
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(0)));

    h.pipeline.run(request.id).await.unwrap();

    assert!(!h.composer.saw_ambient.load(Ordering::SeqCst));
    let row = GenerationRequestRepo::find_by_id(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status(), RequestStatus::Completed);
}

/// An unknown request id is a permanent error.
#[sqlx::test(migrations = "../db/migrations")]
async fn missing_request_is_permanent(pool: PgPool) {
    let h = build_harness(pool.clone(), FakeVideo::new(VideoBehavior::CompleteAfter(0)));
    let err = h.pipeline.run(424242).await.unwrap_err();
    assert!(matches!(err, PipelineError::Permanent(_)));
}
