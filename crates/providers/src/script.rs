//! Script generation adapter over an OpenAI-compatible chat API.

use serde::Deserialize;
use stillpoint_core::pipeline::target_word_count;
use stillpoint_core::request::ScriptType;

use crate::ports::{ProviderError, ScriptPort};

/// Per-request timeout for script generation.
const GENERATE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Configuration for the script provider.
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// API base URL, e.g. `https://api.openai.com`.
    pub base_url: String,
    pub api_key: String,
    /// Model name sent in each request.
    pub model: String,
}

impl ScriptConfig {
    /// Load from `SCRIPT_API_URL` / `SCRIPT_API_KEY` / `SCRIPT_MODEL`.
    ///
    /// # Panics
    ///
    /// Panics if `SCRIPT_API_KEY` is missing -- a worker without provider
    /// credentials must not come up.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SCRIPT_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            api_key: std::env::var("SCRIPT_API_KEY")
                .expect("SCRIPT_API_KEY must be set in the environment"),
            model: std::env::var("SCRIPT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        }
    }
}

/// HTTP client for the script provider.
pub struct ScriptClient {
    client: reqwest::Client,
    config: ScriptConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ScriptClient {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the generation prompt for a meditation script.
    ///
    /// Sized to the spoken duration (~130 words/minute) and themed on
    /// the request's visual prompt.
    fn build_prompt(script_type: ScriptType, duration_seconds: i32, theme: &str) -> String {
        let words = target_word_count(duration_seconds);
        let minutes = duration_seconds / 60;
        let style_hint = match script_type {
            ScriptType::Template => {
                "Follow a classic guided-meditation template: settling in, \
                 body awareness, the central visualization, and a gentle return."
            }
            _ => "Write a flowing guided meditation with natural pauses.",
        };
        format!(
            "Write a calm, slowly paced guided meditation script for a \
             {minutes}-minute session. Aim for roughly {words} words. \
             The listener is watching: {theme}. {style_hint} \
             Return only the script text, no headings or stage directions."
        )
    }
}

#[async_trait::async_trait]
impl ScriptPort for ScriptClient {
    async fn generate(
        &self,
        script_type: ScriptType,
        duration_seconds: i32,
        theme: &str,
    ) -> Result<String, ProviderError> {
        let prompt = Self::build_prompt(script_type, duration_seconds, theme);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.7,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed script response: {e}")))?;

        let script = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if script.trim().is_empty() {
            return Err(ProviderError::Permanent(
                "Script provider returned an empty script".into(),
            ));
        }

        tracing::debug!(
            chars = script.len(),
            duration_seconds,
            "Script generated",
        );
        Ok(script)
    }
}
