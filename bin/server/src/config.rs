//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (for example `ENGINE__LEASE_SECS=600` or
//! `AI__API_KEY=...`).

use leadflow_ai::OpenAiConfig;
use leadflow_integration::WebhookConfig;
use leadflow_scheduler::SchedulerConfig;
use leadflow_workflow::EngineConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum database connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Execution engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Resume scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Model provider used by AI nodes.
    #[serde(default)]
    pub ai: OpenAiConfig,

    /// Outbound webhook delivery.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_database_url_is_required() {
        let config: ServerConfig =
            serde_json::from_value(json!({"database_url": "postgres://localhost/leadflow"}))
                .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.scheduler.interval_secs, 30);
        assert_eq!(config.ai.base_url, "https://api.openai.com/v1");
        assert!(config.ai.api_key.is_none());
        assert_eq!(config.webhook.timeout_secs, 30);
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config: ServerConfig = serde_json::from_value(json!({
            "database_url": "postgres://db/leadflow",
            "engine": {"lease_secs": 60, "retry": {"max_attempts": 5}},
            "scheduler": {"max_concurrent": 2},
            "ai": {"api_key": "sk-test", "base_url": "http://localhost:11434/v1"}
        }))
        .unwrap();
        assert_eq!(config.engine.lease_secs, 60);
        assert_eq!(config.engine.retry.max_attempts, 5);
        assert_eq!(config.engine.retry.initial_backoff_ms, 500);
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
    }
}
