//! Voice synthesis adapter over an ElevenLabs-style TTS API.

use futures_util::StreamExt;

use crate::ports::{ByteStream, ProviderError, VoicePort};

/// Per-request timeout for synthesis, covering the full body download.
const SYNTHESIZE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Voice used when a request does not specify one. All generations
/// currently use the platform narrator voice.
pub const DEFAULT_VOICE_ID: &str = "sp-narrator-en-1";

/// Configuration for the voice provider.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub base_url: String,
    pub api_key: String,
}

impl VoiceConfig {
    /// Load from `VOICE_API_URL` / `VOICE_API_KEY`.
    ///
    /// # Panics
    ///
    /// Panics if `VOICE_API_KEY` is missing.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("VOICE_API_URL")
                .unwrap_or_else(|_| "https://api.elevenlabs.io".into()),
            api_key: std::env::var("VOICE_API_KEY")
                .expect("VOICE_API_KEY must be set in the environment"),
        }
    }
}

/// HTTP client for the voice provider.
pub struct VoiceClient {
    client: reqwest::Client,
    config: VoiceConfig,
}

impl VoiceClient {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl VoicePort for VoiceClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<ByteStream, ProviderError> {
        let body = serde_json::json!({
            "text": text,
            "output_format": "mp3_44100_128",
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{voice_id}",
                self.config.base_url
            ))
            .header("xi-api-key", &self.config.api_key)
            .timeout(SYNTHESIZE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        tracing::debug!(chars = text.len(), voice_id, "Voice synthesis streaming");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProviderError::from_transport));
        Ok(Box::pin(stream))
    }
}
