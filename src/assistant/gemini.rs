//! Gemini-backed assistant gateway.
//!
//! Thin client for the Generative Language REST API. HTTP 429 maps to
//! [`AssistantError::RateLimited`], HTTP 503 and transport failures to
//! [`AssistantError::Unavailable`]; everything else is terminal.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use super::{AssistantError, AssistantGateway};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for the Gemini gateway.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for the Generative Language API.
    pub api_key: String,
    /// Model name, e.g. "gemini-1.5-flash".
    pub model: String,
    /// Base URL override, mainly for tests.
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Gateway implementation backed by the Gemini HTTP API.
pub struct GeminiGateway {
    config: GeminiConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GeminiGateway {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    fn map_failure(status: reqwest::StatusCode, body: &str) -> AssistantError {
        match status.as_u16() {
            429 => AssistantError::RateLimited,
            503 => AssistantError::Unavailable,
            _ => {
                let detail = serde_json::from_str::<ErrorResponse>(body)
                    .ok()
                    .and_then(|e| e.error)
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                AssistantError::Other(detail)
            }
        }
    }
}

#[async_trait]
impl AssistantGateway for GeminiGateway {
    async fn generate(&self, prompt: &str) -> Result<String, AssistantError> {
        if prompt.trim().is_empty() {
            return Err(AssistantError::Other("prompt is required".to_string()));
        }

        debug!("sending prompt to {} ({} chars)", self.config.model, prompt.len());

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await
            .map_err(|e| {
                warn!("assistant request failed to send: {e}");
                AssistantError::Unavailable
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_failure(status, &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Other(format!("malformed assistant response: {e}")))?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AssistantError::Other(
                "assistant returned no content".to_string(),
            ));
        }

        Ok(text)
    }
}
