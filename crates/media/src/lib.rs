//! Media composition: mix voiceover, ambient sound, and music onto the
//! generated video, and extract a thumbnail.
//!
//! Everything runs through `ffmpeg`/`ffprobe` subprocesses over files in
//! a [`Scratch`] directory. The filter graph is built by a pure
//! function so the exact mixing behaviour is unit-testable without
//! ffmpeg installed.

use std::path::{Path, PathBuf};
use std::process::Output;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Mixing parameters
// ---------------------------------------------------------------------------

/// Gain applied to the voiceover track.
pub const GAIN_VOICEOVER: f64 = 1.0;
/// Gain applied to the ambient-sound bed.
pub const GAIN_AMBIENT: f64 = 0.3;
/// Gain applied to the music bed.
pub const GAIN_MUSIC: f64 = 0.2;

/// Timestamp of the thumbnail frame.
const THUMBNAIL_AT: &str = "00:00:02";
/// Thumbnail dimensions.
const THUMBNAIL_SCALE: &str = "scale=1280:720";
/// x264 constant rate factor for the final encode.
const VIDEO_CRF: &str = "23";
/// AAC bitrate for the final audio mix.
const AUDIO_BITRATE: &str = "192k";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from composition and probing.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("ffmpeg/ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg/ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input file not found: {0}")]
    InputNotFound(String),
}

// ---------------------------------------------------------------------------
// Scratch directory
// ---------------------------------------------------------------------------

/// Worker-local scratch space for one pipeline attempt.
///
/// `cleanup()` releases it deterministically; dropping without cleanup
/// still removes the directory best-effort.
pub struct Scratch {
    dir: Option<tempfile::TempDir>,
}

impl Scratch {
    /// Create a fresh scratch directory under the system temp root.
    pub fn new() -> Result<Self, MediaError> {
        let dir = tempfile::Builder::new().prefix("stillpoint-").tempdir()?;
        Ok(Self { dir: Some(dir) })
    }

    /// Absolute path of a file inside the scratch dir.
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir
            .as_ref()
            .expect("scratch used after cleanup")
            .path()
            .join(file_name)
    }

    /// Remove the scratch directory and everything in it.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(?path, error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ffprobe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Read a media file's duration in seconds via ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64, MediaError> {
    if !path.exists() {
        return Err(MediaError::InputNotFound(path.to_string_lossy().into()));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await
        .map_err(MediaError::NotFound)?;
    check_status(&output)?;

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::ParseError(e.to_string()))?;
    parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| MediaError::ParseError("format.duration missing".into()))
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Input files for one composition, all living in the scratch dir.
#[derive(Debug)]
pub struct ComposeInputs {
    pub video: PathBuf,
    pub voiceover: PathBuf,
    pub ambient: Option<PathBuf>,
    pub music: Option<PathBuf>,
}

/// Result of a composition: final video, thumbnail, and the measured
/// duration of the output.
#[derive(Debug)]
pub struct ComposedMedia {
    pub video_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub duration_seconds: f64,
}

/// Composer seam the pipeline is wired against.
///
/// [`Composer`] is the ffmpeg implementation; tests inject doubles that
/// fabricate output files.
#[async_trait::async_trait]
pub trait MediaComposer: Send + Sync {
    /// Produce `final.mp4` + `thumbnail.jpg` in `scratch` from the
    /// given inputs.
    async fn compose(
        &self,
        scratch: &Scratch,
        inputs: &ComposeInputs,
    ) -> Result<ComposedMedia, MediaError>;
}

/// ffmpeg-backed composer.
pub struct Composer;

#[async_trait::async_trait]
impl MediaComposer for Composer {
    /// Mix all audio tracks onto the video and extract a thumbnail.
    ///
    /// Ambient and music beds are looped to cover the full video and
    /// the mix is cut to the shortest stream (the video).
    async fn compose(
        &self,
        scratch: &Scratch,
        inputs: &ComposeInputs,
    ) -> Result<ComposedMedia, MediaError> {
        for required in [&inputs.video, &inputs.voiceover] {
            if !required.exists() {
                return Err(MediaError::InputNotFound(
                    required.to_string_lossy().into(),
                ));
            }
        }

        let video_path = scratch.path("final.mp4");
        let thumbnail_path = scratch.path("thumbnail.jpg");

        let mut cmd = tokio::process::Command::new("ffmpeg");
        cmd.args(["-y", "-i"]).arg(&inputs.video);
        cmd.arg("-i").arg(&inputs.voiceover);
        if let Some(ambient) = &inputs.ambient {
            cmd.args(["-stream_loop", "-1", "-i"]).arg(ambient);
        }
        if let Some(music) = &inputs.music {
            cmd.args(["-stream_loop", "-1", "-i"]).arg(music);
        }

        let filter = build_filter_graph(inputs.ambient.is_some(), inputs.music.is_some());
        cmd.args(["-filter_complex", &filter]);
        cmd.args(["-map", "0:v", "-map", "[aout]"]);
        cmd.args(["-c:v", "libx264", "-crf", VIDEO_CRF]);
        cmd.args(["-c:a", "aac", "-b:a", AUDIO_BITRATE]);
        cmd.arg("-shortest");
        cmd.arg(&video_path);

        let output = cmd.output().await.map_err(MediaError::NotFound)?;
        check_status(&output)?;

        Self::extract_thumbnail(&video_path, &thumbnail_path).await?;
        let duration_seconds = probe_duration(&video_path).await?;

        tracing::info!(
            ?video_path,
            duration_seconds,
            "Composition finished",
        );

        Ok(ComposedMedia {
            video_path,
            thumbnail_path,
            duration_seconds,
        })
    }
}

impl Composer {
    /// Grab a single frame as the thumbnail.
    async fn extract_thumbnail(video: &Path, out: &Path) -> Result<(), MediaError> {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-ss", THUMBNAIL_AT, "-i"])
            .arg(video)
            .args(["-vframes", "1", "-vf", THUMBNAIL_SCALE])
            .arg(out)
            .output()
            .await
            .map_err(MediaError::NotFound)?;
        check_status(&output)
    }
}

/// Build the `-filter_complex` graph for the audio mix.
///
/// Input indices are fixed by argument order in [`Composer::compose`]:
/// 0 video, 1 voiceover, then ambient and music in that order when
/// present. `duration=first` keeps the mix as long as the voiceover;
/// `-shortest` then cuts the container to the video.
fn build_filter_graph(has_ambient: bool, has_music: bool) -> String {
    let mut labels = vec!["[vo]".to_string()];
    let mut chains = vec![format!("[1:a]volume={GAIN_VOICEOVER}[vo]")];
    let mut next_input = 2;

    if has_ambient {
        chains.push(format!("[{next_input}:a]volume={GAIN_AMBIENT}[amb]"));
        labels.push("[amb]".to_string());
        next_input += 1;
    }
    if has_music {
        chains.push(format!("[{next_input}:a]volume={GAIN_MUSIC}[mus]"));
        labels.push("[mus]".to_string());
    }

    if labels.len() == 1 {
        // Voiceover only: no mixing needed, just relabel.
        return format!("[1:a]volume={GAIN_VOICEOVER}[aout]");
    }

    format!(
        "{};{}amix=inputs={}:duration=first[aout]",
        chains.join(";"),
        labels.concat(),
        labels.len()
    )
}

fn check_status(output: &Output) -> Result<(), MediaError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(MediaError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
