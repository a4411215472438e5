//! Error types for hindsight-embeddings

use thiserror::Error;

use hindsight_config::ConfigError;

/// Errors that can occur while initializing a provider or generating embeddings
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Missing or contradictory settings, or a width that disagrees with the target.
    /// Never retried.
    #[error("Embeddings configuration error: {0}")]
    Configuration(String),

    /// Transport failure (connection refused, timeout). Retryable.
    #[error("Embedding provider unreachable: {0}")]
    Connectivity(String),

    /// HTTP 5xx from the backend. Retryable.
    #[error("Embedding server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// HTTP 4xx from the backend. Never retried.
    #[error("Embedding request rejected (HTTP {status}): {body}")]
    Client { status: u16, body: String },

    /// Response body does not have the expected shape. Never retried.
    #[error("Unexpected embeddings response: {0}")]
    InvalidResponse(String),

    /// `encode` called before a successful `initialize`
    #[error("Embeddings provider '{provider}' not initialized. Call initialize() first.")]
    Uninitialized { provider: &'static str },

    /// `initialize` called again after an earlier attempt failed
    #[error("Embeddings provider '{provider}' failed to initialize; construct a new provider")]
    ProviderFailed { provider: &'static str },

    /// A produced vector does not have the target width
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// In-process model failure (loading, tokenization, forward pass)
    #[error("Embedding inference error: {0}")]
    Inference(String),
}

impl EmbeddingError {
    /// Whether the failed attempt may be repeated under a retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Connectivity(_) | EmbeddingError::Server { .. }
        )
    }

    /// Classify a transport error from the HTTP client
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbeddingError::Connectivity(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            EmbeddingError::Connectivity(format!("Connection failed: {}", err))
        } else {
            EmbeddingError::Connectivity(format!("Request failed: {}", err))
        }
    }

    /// Classify a non-success HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() {
            EmbeddingError::Server {
                status: status.as_u16(),
                body,
            }
        } else {
            EmbeddingError::Client {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<ConfigError> for EmbeddingError {
    fn from(err: ConfigError) -> Self {
        EmbeddingError::Configuration(err.to_string())
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::Inference(err.to_string())
    }
}

impl From<anyhow::Error> for EmbeddingError {
    fn from(err: anyhow::Error) -> Self {
        EmbeddingError::Inference(format!("{:#}", err))
    }
}

/// Result type for hindsight-embeddings operations
pub type Result<T> = std::result::Result<T, EmbeddingError>;
