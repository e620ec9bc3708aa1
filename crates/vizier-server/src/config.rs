//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the vizier server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub listen: String,
    /// Model served for standalone exchanges (and both pipeline phases)
    pub model: ModelConfig,
    /// Remote tool provider endpoint
    pub tool_provider: ToolProviderConfig,
    /// Data sources the agent may query (supports a `name.*` prefix form)
    pub allowed_sources: Vec<String>,
    /// Hard ceiling on model calls per exchange
    pub max_turns: u32,
    /// Retry ceiling for transient stream failures
    pub max_retries: u32,
    /// Delay before the first retry, in seconds
    pub retry_initial_delay_secs: u64,
    /// Optional wall-clock bound on a single model call, in seconds
    pub turn_timeout_secs: Option<u64>,
    /// How long persisted documents stay retrievable, in seconds
    pub document_retention_secs: u64,
}

/// Model selection defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub context_window: u32,
    pub max_tokens: u32,
}

/// Remote tool provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolProviderConfig {
    pub base_url: String,
    /// Per-call timeout, in seconds
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            model: ModelConfig::default(),
            tool_provider: ToolProviderConfig::default(),
            allowed_sources: vec![],
            max_turns: 12,
            max_retries: 3,
            retry_initial_delay_secs: 1,
            turn_timeout_secs: None,
            document_retention_secs: 24 * 60 * 60,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "claude-sonnet-4-5-20250929".to_string(),
            name: "Claude Sonnet".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            context_window: 200_000,
            max_tokens: 8192,
        }
    }
}

impl Default for ToolProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vizier")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VIZIER_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from a specific file, or the default location
    pub fn load(path: Option<&PathBuf>) -> Self {
        let path = path.cloned().unwrap_or_else(Self::config_path);
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn retry_policy(&self) -> vizier_agent::RetryPolicy {
        vizier_agent::RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_secs(self.retry_initial_delay_secs),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(Duration::from_secs)
    }

    pub fn document_retention(&self) -> Duration {
        Duration::from_secs(self.document_retention_secs)
    }

    pub fn api_model(&self, id: Option<&str>) -> vizier_ai::Model {
        vizier_ai::Model {
            id: id.unwrap_or(&self.model.id).to_string(),
            name: self.model.name.clone(),
            base_url: self.model.base_url.clone(),
            context_window: self.model.context_window,
            max_tokens: self.model.max_tokens,
            headers: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_turns, 12);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.document_retention_secs, 86_400);
        assert!(config.turn_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            allowed_sources = ["sales", "crm.*"]

            [tool_provider]
            base_url = "http://tools.internal:9090"
            "#,
        )
        .unwrap();
        assert_eq!(config.allowed_sources, vec!["sales", "crm.*"]);
        assert_eq!(config.tool_provider.base_url, "http://tools.internal:9090");
        assert_eq!(config.tool_provider.timeout_secs, 30);
        assert_eq!(config.listen, "127.0.0.1:8080");
    }

    #[test]
    fn test_api_model_override() {
        let config = Config::default();
        let model = config.api_model(Some("claude-haiku-4-5"));
        assert_eq!(model.id, "claude-haiku-4-5");
        assert_eq!(model.base_url, config.model.base_url);
    }
}
