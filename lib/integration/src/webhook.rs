//! HTTP webhook delivery.
//!
//! A `webhook` action's resolved config looks like:
//!
//! ```json
//! { "url": "https://hooks.example.com/lead", "method": "POST",
//!   "headers": { "X-Source": "leadflow" }, "body": { "lead": "..." } }
//! ```
//!
//! `method` defaults to `POST`; `body` defaults to `null`.

use crate::action::{ActionHandler, ActionType};
use crate::error::DispatchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Configuration for webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Value of the `User-Agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("leadflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// A webhook request extracted from a resolved action config.
#[derive(Debug, Clone, PartialEq)]
struct WebhookRequest {
    url: String,
    method: reqwest::Method,
    headers: Vec<(String, String)>,
    body: JsonValue,
}

impl WebhookRequest {
    fn from_config(config: &JsonValue) -> Result<Self, DispatchError> {
        let invalid = |reason: &str| DispatchError::InvalidConfig {
            action_type: ActionType::Webhook.to_string(),
            reason: reason.to_string(),
        };

        let url = config
            .get("url")
            .and_then(JsonValue::as_str)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| invalid("missing 'url'"))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("'url' must be http or https"));
        }

        let method = match config.get("method").and_then(JsonValue::as_str) {
            None => reqwest::Method::POST,
            Some(m) => reqwest::Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid("unrecognized 'method'"))?,
        };

        let headers = match config.get("headers") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            Some(_) => return Err(invalid("'headers' must be an object")),
        };

        Ok(Self {
            url: url.to_string(),
            method,
            headers,
            body: config.get("body").cloned().unwrap_or(JsonValue::Null),
        })
    }
}

/// Delivers `webhook` actions.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    /// Creates a new handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &WebhookConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::InvalidConfig {
                action_type: ActionType::Webhook.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    #[instrument(skip(self, config), fields(action_type = %action_type))]
    async fn handle(
        &self,
        action_type: ActionType,
        config: &JsonValue,
    ) -> Result<JsonValue, DispatchError> {
        let request = WebhookRequest::from_config(config)?;
        debug!(url = %request.url, method = %request.method, "delivering webhook");

        let mut http = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            http = http.header(name, value);
        }
        if !request.body.is_null() {
            http = http.json(&request.body);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout
            } else {
                DispatchError::ConnectionFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            warn!(status, "webhook rejected");
            return Err(DispatchError::from_status(status, text));
        }

        Ok(json!({
            "status": status,
            "body": parse_body(text),
        }))
    }
}

fn parse_body(text: String) -> JsonValue {
    if text.is_empty() {
        return JsonValue::Object(Map::new());
    }
    serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
}
