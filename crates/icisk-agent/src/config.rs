//! Configuration, loaded from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::DEFAULT_MAX_STEPS;
use crate::error::Error;
use crate::llm::retry::RetryConfig;

/// Agent configuration.
///
/// Every field has a default, so an empty file (or no file at all) is
/// a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub provider: ProviderConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    /// Override the OpenAI-compatible endpoint, e.g. for a proxy.
    pub base_url: Option<String>,
    /// Backoff for transient provider errors. Enabled by default.
    pub retry: Option<RetryConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            retry: Some(RetryConfig::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_steps: usize,
    pub max_tokens: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: 2048,
        }
    }
}

impl AgentConfig {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Config(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config = AgentConfig::from_toml("").unwrap();
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.graph.max_steps, DEFAULT_MAX_STEPS);
        assert!(config.provider.retry.is_some());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            [provider]
            model = "gpt-4o"

            [graph]
            max_tokens = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.graph.max_tokens, 4096);
        assert_eq!(config.graph.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn retry_section_overrides_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            [provider.retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        let retry = config.provider.retry.unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.base_delay_ms, RetryConfig::default().base_delay_ms);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AgentConfig::from_toml("provider = 3").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
