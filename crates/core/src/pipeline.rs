//! Pipeline constants and the pure math behind stage progress, video
//! polling, retry backoff, and the worker start-rate window.
//!
//! Keeping these as free functions lets the worker and its tests share
//! exact values without touching I/O.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Stage progress boundaries
// ---------------------------------------------------------------------------

/// Progress when the script stage begins.
pub const PROGRESS_SCRIPT_START: i16 = 5;
/// Progress when the script stage completes.
pub const PROGRESS_SCRIPT_DONE: i16 = 15;
/// Progress when the voice stage begins.
pub const PROGRESS_VOICE_START: i16 = 20;
/// Progress when the voice stage completes.
pub const PROGRESS_VOICE_DONE: i16 = 35;
/// Progress when the video stage begins.
pub const PROGRESS_VIDEO_START: i16 = 40;
/// Progress ceiling while the video provider is still processing.
pub const PROGRESS_VIDEO_CAP: i16 = 75;
/// Progress when the compose stage begins.
pub const PROGRESS_COMPOSE_START: i16 = 78;
/// Progress once composition has produced the final artifacts.
pub const PROGRESS_COMPOSE_DONE: i16 = 95;
/// Terminal progress for a completed request.
pub const PROGRESS_COMPLETE: i16 = 100;

// ---------------------------------------------------------------------------
// Video provider polling
// ---------------------------------------------------------------------------

/// Seconds between successive polls of the video provider.
pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum number of polls before the video stage times out (8 minutes
/// at the default interval).
pub const VIDEO_MAX_POLLS: u32 = 48;

/// Interpolate progress across the video poll loop.
///
/// Maps poll count `0..=VIDEO_MAX_POLLS` onto
/// `PROGRESS_VIDEO_START..=PROGRESS_VIDEO_CAP`, rounding to the nearest
/// point and clamping at the cap.
pub fn video_poll_progress(polls: u32) -> i16 {
    let span = (PROGRESS_VIDEO_CAP - PROGRESS_VIDEO_START) as f64;
    let fraction = polls as f64 / VIDEO_MAX_POLLS as f64;
    let progress = PROGRESS_VIDEO_START as f64 + (fraction * span).round();
    (progress as i16).min(PROGRESS_VIDEO_CAP)
}

// ---------------------------------------------------------------------------
// Retry backoff
// ---------------------------------------------------------------------------

/// Base delay for job retries.
pub const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Default number of delivery attempts per job.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Exponential backoff delay before the next attempt.
///
/// `attempts_made` is the number of attempts already consumed, so the
/// first retry (after attempt 1) waits the base delay.
pub fn retry_backoff(attempts_made: i32) -> Duration {
    let exponent = attempts_made.max(1) as u32 - 1;
    // Saturate rather than overflow for absurd attempt counts.
    let factor = 2u64.saturating_pow(exponent.min(16));
    RETRY_BACKOFF_BASE.saturating_mul(factor as u32)
}

// ---------------------------------------------------------------------------
// Script sizing
// ---------------------------------------------------------------------------

/// Target speaking pace used to size generated scripts.
pub const WORDS_PER_MINUTE: u32 = 130;

/// Word-count target for a script of the given duration.
pub fn target_word_count(duration_seconds: i32) -> u32 {
    let minutes = duration_seconds.max(0) as f64 / 60.0;
    (minutes * WORDS_PER_MINUTE as f64).round() as u32
}

// ---------------------------------------------------------------------------
// Start-rate window
// ---------------------------------------------------------------------------

/// Default cap on job starts per minute across a worker process.
pub const DEFAULT_STARTS_PER_MINUTE: u32 = 10;

/// Sliding-window rate limiter over job start instants.
///
/// Pure bookkeeping: the caller supplies `now` so tests never sleep.
#[derive(Debug)]
pub struct StartWindow {
    starts: Vec<Duration>,
    limit: u32,
    window: Duration,
}

impl StartWindow {
    /// Window with the given per-minute limit.
    pub fn per_minute(limit: u32) -> Self {
        Self {
            starts: Vec::new(),
            limit,
            window: Duration::from_secs(60),
        }
    }

    /// Record a start at `now` if the window has room. Returns whether
    /// the start was admitted.
    pub fn try_start(&mut self, now: Duration) -> bool {
        if !self.has_capacity(now) {
            return false;
        }
        self.starts.push(now);
        true
    }

    /// Whether a start at `now` would be admitted, without recording it.
    pub fn has_capacity(&mut self, now: Duration) -> bool {
        let window = self.window;
        self.starts.retain(|t| now.saturating_sub(*t) < window);
        self.starts.len() < self.limit as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
