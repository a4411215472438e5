//! Configuration loader with layered sources.
//!
//! Loads embeddings settings from multiple sources and merges them:
//! 1. Global config: `~/.hindsight/config.toml`
//! 2. Explicit config file (optional)
//! 3. Process environment (`HINDSIGHT_API_EMBEDDINGS_*`)
//!
//! Later sources override earlier ones, field by field.

use crate::error::ConfigError;
use crate::{EmbeddingsConfig, EmbeddingsSettings};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".hindsight";

/// Layered loader for embeddings configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.hindsight`)
    global_config_dir: Option<PathBuf>,

    /// Explicit config file, applied after the global one
    config_file: Option<PathBuf>,

    /// Whether to read the process environment last
    read_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.hindsight`).
    pub fn new() -> Self {
        Self {
            global_config_dir: dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR)),
            config_file: None,
            read_env: true,
        }
    }

    /// Use a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(mut self, global_dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir = Some(global_dir.into());
        self
    }

    /// Skip the global config file entirely.
    pub fn without_global(mut self) -> Self {
        self.global_config_dir = None;
        self
    }

    /// Apply an explicit config file after the global one.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Enable or disable reading `HINDSIGHT_API_EMBEDDINGS_*` from the environment.
    pub fn with_env(mut self, read_env: bool) -> Self {
        self.read_env = read_env;
        self
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Merge all sources into raw settings without validating them.
    pub fn load_settings(&self) -> Result<EmbeddingsSettings, ConfigError> {
        let mut settings = EmbeddingsSettings::default();

        if let Some(global_path) = self.global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                settings = settings.merge(load_settings_file(&global_path)?);
            } else {
                trace!("Global config not found at {:?}", global_path);
            }
        }

        // An explicitly requested file must exist
        if let Some(ref path) = self.config_file {
            debug!("Loading config from {:?}", path);
            settings = settings.merge(load_settings_file(path)?);
        }

        if self.read_env {
            settings = settings.merge(EmbeddingsSettings::from_env()?);
        }

        Ok(settings)
    }

    /// Load all sources and resolve them into an immutable configuration.
    pub fn load(&self) -> Result<EmbeddingsConfig, ConfigError> {
        let config = self.load_settings()?.resolve()?;
        debug!(
            provider = %config.provider.provider_type(),
            target_dimension = config.target_dimension,
            "Resolved embeddings configuration"
        );
        Ok(config)
    }
}

/// Load the `[embeddings]` table of a configuration file from disk.
pub(crate) fn load_settings_file(path: &Path) -> Result<EmbeddingsSettings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    EmbeddingsSettings::from_toml_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmbeddingProviderType, ProviderConfig};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_defaults_without_sources() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::new()
            .with_global_dir(temp.path())
            .with_env(false);

        let config = loader.load().unwrap();
        assert_eq!(config, EmbeddingsConfig::local());
    }

    #[test]
    fn test_global_config_path() {
        let loader = ConfigLoader::new().with_global_dir("/tmp/hindsight-test");
        assert_eq!(
            loader.global_config_path(),
            Some(PathBuf::from("/tmp/hindsight-test/config.toml"))
        );
    }

    #[test]
    fn test_explicit_file_overrides_global() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            CONFIG_FILE_NAME,
            r#"
[embeddings]
provider = "tei"
tei_url = "http://global:8080"
tei_batch_size = 16
"#,
        );
        let local = write_config(
            temp.path(),
            "local.toml",
            r#"
[embeddings]
tei_url = "http://local:8080"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_dir(temp.path())
            .with_file(&local)
            .with_env(false)
            .load()
            .unwrap();

        let ProviderConfig::Tei(tei) = config.provider else {
            panic!("expected tei provider");
        };
        assert_eq!(tei.base_url, "http://local:8080");
        assert_eq!(tei.batch_size, 16);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        let result = ConfigLoader::new()
            .without_global()
            .with_file(temp.path().join("absent.toml"))
            .with_env(false)
            .load();
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "bad.toml", "[embeddings\nprovider = ");
        let result = ConfigLoader::new()
            .without_global()
            .with_file(&path)
            .with_env(false)
            .load();
        assert!(matches!(result, Err(ConfigError::ParseToml { .. })));
    }

    #[test]
    fn test_file_validation_applies() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            "openai.toml",
            r#"
[embeddings]
provider = "openai"
"#,
        );
        let err = ConfigLoader::new()
            .without_global()
            .with_file(&path)
            .with_env(false)
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("HINDSIGHT_API_EMBEDDINGS_API_KEY"));
    }

    #[test]
    fn test_file_without_embeddings_table() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "other.toml", "[logging]\nlevel = \"debug\"\n");
        let settings = ConfigLoader::new()
            .without_global()
            .with_file(&path)
            .with_env(false)
            .load_settings()
            .unwrap();
        assert_eq!(settings, EmbeddingsSettings::default());
        assert_eq!(
            settings.resolve().unwrap().provider.provider_type(),
            EmbeddingProviderType::Local
        );
    }

    #[test]
    fn test_settings_load_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            "embeddings.toml",
            "[embeddings]\nprovider = \"local\"\nlocal_model = \"BAAI/bge-small-en-v1.5\"\n",
        );
        let settings = EmbeddingsSettings::load_file(&path).unwrap();
        assert_eq!(settings.local_model.as_deref(), Some("BAAI/bge-small-en-v1.5"));
    }
}
