//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint exposing `POST {base_url}/chat/completions`
//! (OpenAI, Azure-style gateways, local proxies).

use crate::error::AiError;
use crate::invoker::{AiInvoker, AiRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "openai";

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL for the API, without the trailing `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key (if required).
    #[serde(default)]
    pub api_key: Option<String>,
    /// System prompt prepended to every request.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Temperature for sampling.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Transport-level timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            system_prompt: None,
            temperature: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    /// Creates a configuration for the public OpenAI API.
    #[must_use]
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }
}

/// An [`AiInvoker`] backed by an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiInvoker {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiInvoker {
    /// Creates a new invoker.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Builds the chat completions request body.
    #[must_use]
    pub fn request_body(&self, request: &AiRequest) -> JsonValue {
        let mut messages = Vec::new();
        if let Some(system) = &self.config.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.user_message() }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl AiInvoker for OpenAiInvoker {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn invoke(&self, request: &AiRequest) -> Result<String, AiError> {
        let mut http = self.client.post(self.endpoint()).json(&self.request_body(request));
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, body));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AiError::ResponseParseFailed {
                reason: e.to_string(),
            })?;
        let text = completion_text(&body)?;
        debug!(chars = text.len(), "AI completion received");
        Ok(text)
    }
}

fn transport_error(err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout
    } else {
        AiError::ProviderUnavailable {
            provider: PROVIDER.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Maps a non-success HTTP status to a classified error.
#[must_use]
pub fn classify_status(status: u16, retry_after_secs: Option<u64>, body: String) -> AiError {
    match status {
        408 => AiError::Timeout,
        429 => AiError::RateLimited { retry_after_secs },
        500..=599 => AiError::ProviderUnavailable {
            provider: PROVIDER.to_string(),
            reason: format!("HTTP {status}: {body}"),
        },
        _ => AiError::InvalidRequest {
            reason: format!("HTTP {status}: {body}"),
        },
    }
}

/// Extracts `choices[0].message.content` from a completion response.
///
/// # Errors
///
/// Returns an error if the response has no text content.
pub fn completion_text(body: &JsonValue) -> Result<String, AiError> {
    body.pointer("/choices/0/message/content")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| AiError::ResponseParseFailed {
            reason: "response has no choices[0].message.content".to_string(),
        })
}
