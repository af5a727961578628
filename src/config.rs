//! Configuration management for convosync
//!
//! This module handles loading, parsing, and validating configuration
//! from YAML files, with sensible defaults for every field.

use crate::error::{ConvosyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for convosync
///
/// Holds provider settings and the tuning knobs of the synchronization
/// core (page sizes, cache capacities, retry limits).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Synchronization core settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Completion provider configuration
///
/// Specifies which provider to use by default and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Id of the default provider
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// OpenAI configuration
    #[serde(default)]
    pub openai: OpenAiConfig,
}

fn default_provider_type() -> String {
    "openai".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            openai: OpenAiConfig::default(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Default model to request completions from
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Optional API base URL (useful for tests and local mocks)
    ///
    /// When set, this base is used to build the Responses API endpoint,
    /// which allows tests to point the service at a mock server.
    #[serde(default)]
    pub api_base: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_openai_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            api_base: None,
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Synchronization core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Page size used when aggregating usage totals
    #[serde(default = "default_usage_page_limit")]
    pub usage_page_limit: usize,

    /// Capacity of each scoped usage-totals cache
    #[serde(default = "default_usage_totals_capacity")]
    pub usage_totals_capacity: usize,

    /// Maximum completion retry attempts before errors stop being retryable
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Capacity of each action broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_usage_page_limit() -> usize {
    10
}

fn default_usage_totals_capacity() -> usize {
    10
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            usage_page_limit: default_usage_page_limit(),
            usage_totals_capacity: default_usage_totals_capacity(),
            max_retry_attempts: default_max_retry_attempts(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConvosyncError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any field holds a value the core cannot
    /// operate with (zero page sizes, zero capacities).
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type.is_empty() {
            return Err(ConvosyncError::Config("provider type must not be empty".into()).into());
        }
        if self.sync.usage_page_limit == 0 {
            return Err(ConvosyncError::Config("usage_page_limit must be > 0".into()).into());
        }
        if self.sync.usage_totals_capacity == 0 {
            return Err(ConvosyncError::Config("usage_totals_capacity must be > 0".into()).into());
        }
        if self.sync.channel_capacity == 0 {
            return Err(ConvosyncError::Config("channel_capacity must be > 0".into()).into());
        }
        Ok(())
    }
}
