//! Hindsight Embeddings Configuration
//!
//! Names the recognized embeddings options and resolves them into an
//! immutable [`EmbeddingsConfig`]:
//! - Environment: `HINDSIGHT_API_EMBEDDINGS_*` (see [`env`])
//! - TOML: the `[embeddings]` table of `~/.hindsight/config.toml` or an explicit file
//!
//! Settings are merged in order: defaults → global file → explicit file → environment,
//! then [`EmbeddingsSettings::resolve`] selects the provider kind and checks that the
//! settings it needs are present.
//!
//! # Example TOML
//!
//! ```toml
//! [embeddings]
//! provider = "tei"   # or "local" or "openai"
//! tei_url = "http://localhost:8080"
//! tei_batch_size = 32
//! ```

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Vector width required by the memory store's embedding column.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Default model for the in-process provider (384-dim).
pub const DEFAULT_LOCAL_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Default model for the hosted API provider.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-large";

/// Public hosted API endpoint used when no base URL is configured.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TEI_BATCH_SIZE: usize = 32;
const DEFAULT_TEI_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_OPENAI_BATCH_SIZE: usize = 128;
const DEFAULT_OPENAI_MAX_RETRIES: u32 = 0;

/// Environment variable names for every recognized option.
pub mod env {
    pub const PROVIDER: &str = "HINDSIGHT_API_EMBEDDINGS_PROVIDER";
    pub const LOCAL_MODEL: &str = "HINDSIGHT_API_EMBEDDINGS_LOCAL_MODEL";
    pub const TEI_URL: &str = "HINDSIGHT_API_EMBEDDINGS_TEI_URL";
    pub const TEI_BATCH_SIZE: &str = "HINDSIGHT_API_EMBEDDINGS_TEI_BATCH_SIZE";
    pub const TEI_TIMEOUT: &str = "HINDSIGHT_API_EMBEDDINGS_TEI_TIMEOUT";
    pub const TEI_MAX_RETRIES: &str = "HINDSIGHT_API_EMBEDDINGS_TEI_MAX_RETRIES";
    pub const TEI_RETRY_DELAY: &str = "HINDSIGHT_API_EMBEDDINGS_TEI_RETRY_DELAY";
    pub const API_KEY: &str = "HINDSIGHT_API_EMBEDDINGS_API_KEY";
    pub const BASE_URL: &str = "HINDSIGHT_API_EMBEDDINGS_BASE_URL";
    pub const MODEL: &str = "HINDSIGHT_API_EMBEDDINGS_MODEL";
    pub const DIMENSIONS: &str = "HINDSIGHT_API_EMBEDDINGS_DIMENSIONS";
    pub const AZURE_DEPLOYMENT: &str = "HINDSIGHT_API_EMBEDDINGS_AZURE_DEPLOYMENT";
    pub const AZURE_API_VERSION: &str = "HINDSIGHT_API_EMBEDDINGS_AZURE_API_VERSION";
    pub const OPENAI_BATCH_SIZE: &str = "HINDSIGHT_API_EMBEDDINGS_OPENAI_BATCH_SIZE";
    pub const OPENAI_TIMEOUT: &str = "HINDSIGHT_API_EMBEDDINGS_OPENAI_TIMEOUT";
    pub const OPENAI_MAX_RETRIES: &str = "HINDSIGHT_API_EMBEDDINGS_OPENAI_MAX_RETRIES";
    pub const OPENAI_RETRY_DELAY: &str = "HINDSIGHT_API_EMBEDDINGS_OPENAI_RETRY_DELAY";
}

/// Embedding provider type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// In-process model (default)
    #[default]
    Local,
    /// Text Embeddings Inference server
    Tei,
    /// OpenAI-compatible hosted API, including Azure routes
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Tei => write!(f, "tei"),
            Self::Openai => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "tei" => Ok(Self::Tei),
            "openai" => Ok(Self::Openai),
            _ => Err(ConfigError::invalid_value(
                env::PROVIDER,
                format!(
                    "unknown embeddings provider '{}'. Supported: local, tei, openai",
                    s
                ),
            )),
        }
    }
}

/// Settings for the in-process model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Hugging Face model identifier
    pub model_id: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_LOCAL_MODEL.to_string(),
        }
    }
}

impl LocalConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

/// Settings for the Text Embeddings Inference provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TeiConfig {
    /// Server base URL (e.g., "http://localhost:8080")
    pub base_url: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Maximum number of texts per `/embed` request
    pub batch_size: usize,
    /// Additional attempts after the first one fails transiently
    pub max_retries: u32,
    /// First backoff delay; doubles after each retry
    pub retry_base_delay: Duration,
    /// Probe the server once during initialization to confirm its output width
    pub verify_dimension: bool,
}

impl TeiConfig {
    /// Create config for a server with default batching and retry settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            batch_size: DEFAULT_TEI_BATCH_SIZE,
            max_retries: DEFAULT_TEI_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            verify_dimension: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_dimension_probe(mut self, enabled: bool) -> Self {
        self.verify_dimension = enabled;
        self
    }
}

/// Settings for the OpenAI-compatible hosted API provider.
///
/// Routing between the public API and the two Azure styles is derived from
/// `base_url`, `azure_deployment` and `azure_api_version` when the provider
/// initializes.
#[derive(Clone, PartialEq)]
pub struct OpenAIConfig {
    /// API credential (required)
    pub api_key: Option<String>,
    /// Base URL; `None` means the public endpoint
    pub base_url: Option<String>,
    /// Model name, or the deployment name on the Azure v1 route
    pub model: String,
    /// Output dimension requested from the API
    pub dimensions: usize,
    /// Azure deployment name (selects the deployments route)
    pub azure_deployment: Option<String>,
    /// Azure API version (required by the deployments route)
    pub azure_api_version: Option<String>,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Maximum number of texts per request
    pub batch_size: usize,
    /// Additional attempts after a transient failure
    pub max_retries: u32,
    /// First backoff delay; doubles after each retry
    pub retry_base_delay: Duration,
}

impl OpenAIConfig {
    /// Create config for the public API with the given key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            dimensions: EMBEDDING_DIMENSION,
            azure_deployment: None,
            azure_api_version: None,
            timeout: DEFAULT_TIMEOUT,
            batch_size: DEFAULT_OPENAI_BATCH_SIZE,
            max_retries: DEFAULT_OPENAI_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Route through `/openai/deployments/{deployment}` (Azure resource endpoint)
    pub fn with_azure_deployment(
        mut self,
        deployment: impl Into<String>,
        api_version: Option<String>,
    ) -> Self {
        self.azure_deployment = Some(deployment.into());
        self.azure_api_version = api_version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }
}

impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("azure_deployment", &self.azure_deployment)
            .field("azure_api_version", &self.azure_api_version)
            .field("timeout", &self.timeout)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .finish()
    }
}

/// Backend-specific settings for exactly one provider kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    Local(LocalConfig),
    Tei(TeiConfig),
    OpenAi(OpenAIConfig),
}

impl ProviderConfig {
    pub fn provider_type(&self) -> EmbeddingProviderType {
        match self {
            Self::Local(_) => EmbeddingProviderType::Local,
            Self::Tei(_) => EmbeddingProviderType::Tei,
            Self::OpenAi(_) => EmbeddingProviderType::Openai,
        }
    }
}

/// Resolved embeddings configuration.
///
/// Built once at startup and handed to the provider factory.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingsConfig {
    /// Width every produced vector must have
    pub target_dimension: usize,
    /// Selected provider and its settings
    pub provider: ProviderConfig,
}

impl EmbeddingsConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            target_dimension: EMBEDDING_DIMENSION,
            provider,
        }
    }

    /// Create config for the local provider with the default model
    pub fn local() -> Self {
        Self::new(ProviderConfig::Local(LocalConfig::default()))
    }

    pub fn tei(config: TeiConfig) -> Self {
        Self::new(ProviderConfig::Tei(config))
    }

    pub fn openai(config: OpenAIConfig) -> Self {
        Self::new(ProviderConfig::OpenAi(config))
    }

    /// Override the vector width (alternate schemas, tests)
    pub fn with_target_dimension(mut self, target_dimension: usize) -> Self {
        self.target_dimension = target_dimension;
        self
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// Raw, unvalidated embeddings options as read from files or the environment.
///
/// Every field is optional so that sources can be layered with [`merge`](Self::merge).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsSettings {
    pub provider: Option<String>,
    pub local_model: Option<String>,
    pub tei_url: Option<String>,
    pub tei_batch_size: Option<usize>,
    pub tei_timeout_secs: Option<f64>,
    pub tei_max_retries: Option<u32>,
    pub tei_retry_delay_secs: Option<f64>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
    pub openai_batch_size: Option<usize>,
    pub openai_timeout_secs: Option<f64>,
    pub openai_max_retries: Option<u32>,
    pub openai_retry_delay_secs: Option<f64>,
}

impl std::fmt::Debug for EmbeddingsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingsSettings")
            .field("provider", &self.provider)
            .field("local_model", &self.local_model)
            .field("tei_url", &self.tei_url)
            .field("tei_batch_size", &self.tei_batch_size)
            .field("tei_timeout_secs", &self.tei_timeout_secs)
            .field("tei_max_retries", &self.tei_max_retries)
            .field("tei_retry_delay_secs", &self.tei_retry_delay_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("azure_deployment", &self.azure_deployment)
            .field("azure_api_version", &self.azure_api_version)
            .field("openai_batch_size", &self.openai_batch_size)
            .field("openai_timeout_secs", &self.openai_timeout_secs)
            .field("openai_max_retries", &self.openai_max_retries)
            .field("openai_retry_delay_secs", &self.openai_retry_delay_secs)
            .finish()
    }
}

/// Top-level layout of a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ConfigFile {
    pub embeddings: EmbeddingsSettings,
}

impl EmbeddingsSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Read settings from an explicit set of variables.
    ///
    /// Empty values are treated as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        let text = |key: &str| vars.get(key).map(|v| v.trim().to_string());

        Ok(Self {
            provider: text(env::PROVIDER),
            local_model: text(env::LOCAL_MODEL),
            tei_url: text(env::TEI_URL),
            tei_batch_size: parse_var(&vars, env::TEI_BATCH_SIZE)?,
            tei_timeout_secs: parse_var(&vars, env::TEI_TIMEOUT)?,
            tei_max_retries: parse_var(&vars, env::TEI_MAX_RETRIES)?,
            tei_retry_delay_secs: parse_var(&vars, env::TEI_RETRY_DELAY)?,
            api_key: text(env::API_KEY),
            base_url: text(env::BASE_URL),
            model: text(env::MODEL),
            dimensions: parse_var(&vars, env::DIMENSIONS)?,
            azure_deployment: text(env::AZURE_DEPLOYMENT),
            azure_api_version: text(env::AZURE_API_VERSION),
            openai_batch_size: parse_var(&vars, env::OPENAI_BATCH_SIZE)?,
            openai_timeout_secs: parse_var(&vars, env::OPENAI_TIMEOUT)?,
            openai_max_retries: parse_var(&vars, env::OPENAI_MAX_RETRIES)?,
            openai_retry_delay_secs: parse_var(&vars, env::OPENAI_RETRY_DELAY)?,
        })
    }

    /// Read the `[embeddings]` table of a TOML file on disk.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        loader::load_settings_file(path.as_ref())
    }

    /// Parse the `[embeddings]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.embeddings)
    }

    /// Layer `overlay` on top of `self`; any value set in `overlay` wins.
    pub fn merge(self, overlay: EmbeddingsSettings) -> Self {
        Self {
            provider: overlay.provider.or(self.provider),
            local_model: overlay.local_model.or(self.local_model),
            tei_url: overlay.tei_url.or(self.tei_url),
            tei_batch_size: overlay.tei_batch_size.or(self.tei_batch_size),
            tei_timeout_secs: overlay.tei_timeout_secs.or(self.tei_timeout_secs),
            tei_max_retries: overlay.tei_max_retries.or(self.tei_max_retries),
            tei_retry_delay_secs: overlay.tei_retry_delay_secs.or(self.tei_retry_delay_secs),
            api_key: overlay.api_key.or(self.api_key),
            base_url: overlay.base_url.or(self.base_url),
            model: overlay.model.or(self.model),
            dimensions: overlay.dimensions.or(self.dimensions),
            azure_deployment: overlay.azure_deployment.or(self.azure_deployment),
            azure_api_version: overlay.azure_api_version.or(self.azure_api_version),
            openai_batch_size: overlay.openai_batch_size.or(self.openai_batch_size),
            openai_timeout_secs: overlay.openai_timeout_secs.or(self.openai_timeout_secs),
            openai_max_retries: overlay.openai_max_retries.or(self.openai_max_retries),
            openai_retry_delay_secs: overlay
                .openai_retry_delay_secs
                .or(self.openai_retry_delay_secs),
        }
    }

    /// Select the provider kind and validate the settings it requires.
    ///
    /// Settings belonging to other provider kinds are ignored.
    pub fn resolve(&self) -> Result<EmbeddingsConfig, ConfigError> {
        let kind: EmbeddingProviderType = match self.provider.as_deref() {
            Some(value) => value.parse()?,
            None => EmbeddingProviderType::default(),
        };

        let provider = match kind {
            EmbeddingProviderType::Local => ProviderConfig::Local(LocalConfig::new(
                self.local_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
            )),
            EmbeddingProviderType::Tei => {
                let base_url = self
                    .tei_url
                    .clone()
                    .ok_or_else(|| ConfigError::missing(env::TEI_URL, kind.to_string()))?;
                let mut config = TeiConfig::new(base_url);
                if let Some(batch_size) = self.tei_batch_size {
                    config.batch_size = positive(env::TEI_BATCH_SIZE, batch_size)?;
                }
                if let Some(secs) = self.tei_timeout_secs {
                    config.timeout = duration(env::TEI_TIMEOUT, secs, false)?;
                }
                if let Some(retries) = self.tei_max_retries {
                    config.max_retries = retries;
                }
                if let Some(secs) = self.tei_retry_delay_secs {
                    config.retry_base_delay = duration(env::TEI_RETRY_DELAY, secs, true)?;
                }
                ProviderConfig::Tei(config)
            }
            EmbeddingProviderType::Openai => {
                let api_key = self
                    .api_key
                    .clone()
                    .ok_or_else(|| ConfigError::missing(env::API_KEY, kind.to_string()))?;
                let mut config = OpenAIConfig::new(api_key);
                config.base_url = self.base_url.clone();
                if let Some(ref model) = self.model {
                    config.model = model.clone();
                }
                if let Some(dimensions) = self.dimensions {
                    config.dimensions = positive(env::DIMENSIONS, dimensions)?;
                }
                config.azure_deployment = self.azure_deployment.clone();
                config.azure_api_version = self.azure_api_version.clone();
                if let Some(batch_size) = self.openai_batch_size {
                    config.batch_size = positive(env::OPENAI_BATCH_SIZE, batch_size)?;
                }
                if let Some(secs) = self.openai_timeout_secs {
                    config.timeout = duration(env::OPENAI_TIMEOUT, secs, false)?;
                }
                if let Some(retries) = self.openai_max_retries {
                    config.max_retries = retries;
                }
                if let Some(secs) = self.openai_retry_delay_secs {
                    config.retry_base_delay = duration(env::OPENAI_RETRY_DELAY, secs, true)?;
                }
                ProviderConfig::OpenAi(config)
            }
        };

        Ok(EmbeddingsConfig::new(provider))
    }
}

fn parse_var<T>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    vars.get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid_value(key, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

fn positive(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid_value(key, "must be greater than 0"));
    }
    Ok(value)
}

fn duration(key: &str, secs: f64, allow_zero: bool) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs < 0.0 || (!allow_zero && secs == 0.0) {
        return Err(ConfigError::invalid_value(
            key,
            format!("'{}' is not a valid number of seconds", secs),
        ));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        ConfigError::invalid_value(key, format!("'{}' seconds is out of range: {}", secs, e))
    })
}
