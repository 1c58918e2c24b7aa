//! The three provider ports the pipeline is wired against.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use stillpoint_core::request::ScriptType;

/// Streamed response body. Multi-megabyte payloads flow through this
/// without ever being materialized in memory.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Failure from any provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Worth retrying: network trouble, 5xx, rate limiting.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Retrying will not help: bad request, content policy, 4xx.
    #[error("Permanent provider error: {0}")]
    Permanent(String),

    /// A bounded wait elapsed.
    #[error("{0}")]
    Timeout(String),

    /// The operation was called in a state that does not allow it
    /// (e.g. fetching a video that has not completed).
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ProviderError {
    /// Classify a transport-level reqwest failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transient(format!("Request failed: {err}"))
        } else {
            Self::Transient(format!("HTTP error: {err}"))
        }
    }

    /// Classify a non-2xx response. 4xx is permanent except 429; 5xx is
    /// transient.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status.as_u16() == 429 || status.is_server_error() {
            Self::Transient(format!("Provider returned {status}: {body}"))
        } else {
            Self::Permanent(format!("Provider returned {status}: {body}"))
        }
    }
}

/// Text-generation provider producing meditation scripts.
#[async_trait::async_trait]
pub trait ScriptPort: Send + Sync {
    /// Generate a script sized for `duration_seconds`, themed on the
    /// request's visual prompt.
    async fn generate(
        &self,
        script_type: ScriptType,
        duration_seconds: i32,
        theme: &str,
    ) -> Result<String, ProviderError>;
}

/// Text-to-speech provider.
#[async_trait::async_trait]
pub trait VoicePort: Send + Sync {
    /// Synthesize `text` with the given voice; returns an MP3 byte
    /// stream.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<ByteStream, ProviderError>;
}

/// State of a long-running video generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoJobState {
    /// Still rendering; poll again later.
    Processing,
    /// Finished; the artifact is downloadable.
    Completed { download_uri: String },
    /// The provider gave up on this job.
    Failed { error: String },
}

/// Long-running video generation provider.
#[async_trait::async_trait]
pub trait VideoPort: Send + Sync {
    /// Submit a generation job; returns the provider's opaque job id.
    async fn start(&self, prompt: &str, duration_seconds: i32) -> Result<String, ProviderError>;

    /// Poll a job's state.
    async fn poll(&self, job_id: &str) -> Result<VideoJobState, ProviderError>;

    /// Download the finished artifact as a byte stream.
    ///
    /// Fails with [`ProviderError::InvalidState`] unless the job has
    /// completed.
    async fn fetch(&self, job_id: &str) -> Result<ByteStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        let err = ProviderError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, ProviderError::Transient(_)));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = ProviderError::from_status(reqwest::StatusCode::BAD_GATEWAY, "oops");
        assert!(matches!(err, ProviderError::Transient(_)));
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = ProviderError::from_status(reqwest::StatusCode::BAD_REQUEST, "bad prompt");
        assert!(matches!(err, ProviderError::Permanent(_)));
        let err = ProviderError::from_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "policy");
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}
