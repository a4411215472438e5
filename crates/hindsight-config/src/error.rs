//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or resolving embeddings configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting required by the selected provider is absent
    #[error("{key} is required when {selector} is '{provider}'")]
    MissingSetting {
        key: String,
        selector: String,
        provider: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    /// Create a new ReadFile error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a new ParseToml error.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Create a new MissingSetting error for the given provider.
    pub fn missing(key: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::MissingSetting {
            key: key.into(),
            selector: crate::env::PROVIDER.to_string(),
            provider: provider.into(),
        }
    }

    /// Create a new InvalidValue error.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::invalid_value("HINDSIGHT_API_EMBEDDINGS_TEI_BATCH_SIZE", "must be > 0");
        assert!(err.to_string().contains("HINDSIGHT_API_EMBEDDINGS_TEI_BATCH_SIZE"));
        assert!(err.to_string().contains("must be > 0"));
    }

    #[test]
    fn test_missing_setting_names_selector() {
        let err = ConfigError::missing("HINDSIGHT_API_EMBEDDINGS_TEI_URL", "tei");
        assert_eq!(
            err.to_string(),
            "HINDSIGHT_API_EMBEDDINGS_TEI_URL is required when HINDSIGHT_API_EMBEDDINGS_PROVIDER is 'tei'"
        );
    }
}
