//! Object-storage key layout.
//!
//! Every artifact of a generation lives under a prefix derived from the
//! request id, so retried attempts overwrite their own earlier uploads
//! instead of leaking orphans.

use stillpoint_core::types::DbId;

/// Content type for voiceover uploads.
pub const CONTENT_TYPE_AUDIO: &str = "audio/mpeg";
/// Content type for final video uploads.
pub const CONTENT_TYPE_VIDEO: &str = "video/mp4";
/// Content type for thumbnail uploads.
pub const CONTENT_TYPE_THUMBNAIL: &str = "image/jpeg";

/// Stage-3 intermediate voiceover.
pub fn voiceover_key(request_id: DbId) -> String {
    format!("generations/{request_id}/voiceover.mp3")
}

/// Final composed video.
pub fn final_video_key(request_id: DbId) -> String {
    format!("videos/{request_id}/final.mp4")
}

/// Thumbnail for the final video.
pub fn thumbnail_key(request_id: DbId) -> String {
    format!("videos/{request_id}/thumbnail.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_by_request_id() {
        assert_eq!(voiceover_key(7), "generations/7/voiceover.mp3");
        assert_eq!(final_video_key(7), "videos/7/final.mp4");
        assert_eq!(thumbnail_key(7), "videos/7/thumbnail.jpg");
    }
}
