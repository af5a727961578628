//! Error types for convosync
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for convosync operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, provider interactions, durable-store access,
/// and settings updates.
#[derive(Error, Debug)]
pub enum ConvosyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (unknown provider id, bad catalog entry)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Durable-store errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Settings store errors (unknown key, type mismatch)
    #[error("Settings error: {0}")]
    Settings(String),

    /// Missing credentials for a provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for convosync operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConvosyncError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_provider_error_display() {
        let error = ConvosyncError::Provider("unknown provider: acme".to_string());
        assert_eq!(error.to_string(), "Provider error: unknown provider: acme");
    }

    #[test]
    fn test_storage_error_display() {
        let error = ConvosyncError::Storage("database connection failed".to_string());
        assert_eq!(
            error.to_string(),
            "Storage error: database connection failed"
        );
    }

    #[test]
    fn test_settings_error_display() {
        let error = ConvosyncError::Settings("invalid type for key".to_string());
        assert_eq!(error.to_string(), "Settings error: invalid type for key");
    }

    #[test]
    fn test_missing_credentials_display() {
        let error = ConvosyncError::MissingCredentials("openai".to_string());
        assert_eq!(
            error.to_string(),
            "Missing credentials for provider: openai"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ConvosyncError = io_error.into();
        assert!(matches!(error, ConvosyncError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: ConvosyncError = json_error.into();
        assert!(matches!(error, ConvosyncError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_str = "invalid: : yaml";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: ConvosyncError = yaml_error.into();
        assert!(matches!(error, ConvosyncError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConvosyncError>();
    }
}
