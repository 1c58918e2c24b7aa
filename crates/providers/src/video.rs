//! Long-running video generation adapter (Veo-style operations API).
//!
//! The provider models generation as an operation: `start` submits and
//! returns an opaque job id, `poll` reads the operation state, and
//! `fetch` streams the artifact once the operation reports done.

use futures_util::StreamExt;
use serde::Deserialize;

use crate::ports::{ByteStream, ProviderError, VideoJobState, VideoPort};

/// Per-request timeout for job submission.
const START_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Per-request timeout for a single poll.
const POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Per-request timeout for the artifact download (covers the body).
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Configuration for the video provider.
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub base_url: String,
    pub api_key: String,
}

impl VideoConfig {
    /// Load from `VIDEO_API_URL` / `VIDEO_API_KEY`.
    ///
    /// # Panics
    ///
    /// Panics if `VIDEO_API_KEY` is missing.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VIDEO_API_URL")
                .unwrap_or_else(|_| "https://video.googleapis.com".into()),
            api_key: std::env::var("VIDEO_API_KEY")
                .expect("VIDEO_API_KEY must be set in the environment"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    /// `"processing"`, `"completed"`, or `"failed"`.
    status: String,
    download_uri: Option<String>,
    error: Option<String>,
}

/// HTTP client for the video provider.
pub struct VeoClient {
    client: reqwest::Client,
    config: VideoConfig,
}

impl VeoClient {
    pub fn new(config: VideoConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn read_operation(&self, job_id: &str) -> Result<OperationResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/operations/{job_id}", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed operation response: {e}")))
    }
}

#[async_trait::async_trait]
impl VideoPort for VeoClient {
    async fn start(&self, prompt: &str, duration_seconds: i32) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "prompt": prompt,
            "duration_seconds": duration_seconds,
            "aspect_ratio": "16:9",
        });

        let response = self
            .client
            .post(format!("{}/v1/generations", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .timeout(START_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: StartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed start response: {e}")))?;

        tracing::info!(job_id = %parsed.job_id, duration_seconds, "Veo job started");
        Ok(parsed.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<VideoJobState, ProviderError> {
        let op = self.read_operation(job_id).await?;
        match op.status.as_str() {
            "processing" => Ok(VideoJobState::Processing),
            "completed" => {
                let download_uri = op.download_uri.ok_or_else(|| {
                    ProviderError::Transient(
                        "Completed operation is missing its download uri".into(),
                    )
                })?;
                Ok(VideoJobState::Completed { download_uri })
            }
            "failed" => Ok(VideoJobState::Failed {
                error: op
                    .error
                    .unwrap_or_else(|| "Video generation failed".to_string()),
            }),
            other => Err(ProviderError::Transient(format!(
                "Unknown operation status '{other}'"
            ))),
        }
    }

    async fn fetch(&self, job_id: &str) -> Result<ByteStream, ProviderError> {
        let download_uri = match self.poll(job_id).await? {
            VideoJobState::Completed { download_uri } => download_uri,
            VideoJobState::Processing => {
                return Err(ProviderError::InvalidState(format!(
                    "Job {job_id} is still processing"
                )));
            }
            VideoJobState::Failed { error } => {
                return Err(ProviderError::InvalidState(format!(
                    "Job {job_id} failed: {error}"
                )));
            }
        };

        let response = self
            .client
            .get(&download_uri)
            .bearer_auth(&self.config.api_key)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProviderError::from_transport));
        Ok(Box::pin(stream))
    }
}
