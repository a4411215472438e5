//! Text Embeddings Inference (TEI) provider
//!
//! Talks to a HuggingFace TEI server over HTTP.
//!
//! # Endpoint Format
//!
//! - GET `{base_url}/info` → `{"model_id": "...", ...}`
//! - POST `{base_url}/embed`
//!   - Request: `{"inputs": ["text1", "text2", ...]}`
//!   - Response: `[[...], [...]]` (one vector per input, input order)
//!
//! Input is split into chunks of `batch_size`; each chunk is one POST and is
//! retried on its own under the configured [`RetryPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use hindsight_embeddings::{TeiConfig, TeiProvider};
//!
//! let provider = TeiProvider::new(TeiConfig::new("http://localhost:8080"), 384);
//! provider.initialize().await?;
//! let embeddings = provider.encode(vec!["hello world".into()]).await?;
//! ```

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hindsight_config::TeiConfig;

use crate::error::{EmbeddingError, Result};
use crate::provider::{
    check_vectors, EmbeddingProvider, EmbeddingProviderType, Lifecycle, ProviderState,
};
use crate::retry::RetryPolicy;

/// Text sent once during initialization to learn the server's output width
const PROBE_TEXT: &str = "dimension probe";

/// Reported when `/info` does not name a model
const UNKNOWN_MODEL: &str = "unknown";

/// Request body for TEI /embed endpoint
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

/// Subset of the TEI /info response
#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    model_id: Option<String>,
}

/// Resources available once initialized
#[derive(Debug)]
struct Connection {
    client: Client,
    model_id: String,
}

/// Remote inference provider backed by a TEI server
#[derive(Debug)]
pub struct TeiProvider {
    config: TeiConfig,
    base_url: String,
    target_dimension: usize,
    retry: RetryPolicy,
    lifecycle: Lifecycle,
    connection: OnceCell<Connection>,
}

impl TeiProvider {
    pub fn new(config: TeiConfig, target_dimension: usize) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let retry = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        Self {
            config,
            base_url,
            target_dimension,
            retry,
            lifecycle: Lifecycle::new("tei"),
            connection: OnceCell::new(),
        }
    }

    /// Server base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model reported by the server's `/info` endpoint, once initialized
    pub fn model_id(&self) -> Option<&str> {
        self.connection.get().map(|c| c.model_id.as_str())
    }

    async fn connect(&self) -> Result<Connection> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Connectivity(format!("HTTP client error: {}", e)))?;

        let model_id = self
            .retry
            .run("tei info", || self.fetch_model_id(&client))
            .await?;

        if self.config.verify_dimension {
            let probe = [PROBE_TEXT.to_string()];
            let vectors = self
                .retry
                .run("tei probe", || self.embed_chunk(&client, &probe))
                .await?;

            let actual = match vectors.as_slice() {
                [vector] => vector.len(),
                _ => {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "expected 1 embedding for dimension probe, got {}",
                        vectors.len()
                    )))
                }
            };

            if actual != self.target_dimension {
                return Err(EmbeddingError::Configuration(format!(
                    "TEI model '{}' at {} produces {}-dimensional embeddings, \
                     but schema requires {}",
                    model_id, self.base_url, actual, self.target_dimension
                )));
            }
        }

        Ok(Connection { client, model_id })
    }

    async fn fetch_model_id(&self, client: &Client) -> Result<String> {
        let url = format!("{}/info", self.base_url);
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(EmbeddingError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::from_status(status, body));
        }

        let info: InfoResponse = response.json().await.map_err(decode_error)?;
        Ok(info.model_id.unwrap_or_else(|| UNKNOWN_MODEL.to_string()))
    }

    /// Send one chunk to `/embed`
    async fn embed_chunk(&self, client: &Client, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let response = client
            .post(&url)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await
            .map_err(EmbeddingError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::from_status(status, body));
        }

        response.json().await.map_err(decode_error)
    }
}

/// A timeout while reading the body is still a transport failure
fn decode_error(err: reqwest::Error) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::from_transport(err)
    } else {
        EmbeddingError::InvalidResponse(err.to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for TeiProvider {
    fn provider_name(&self) -> &'static str {
        "tei"
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Tei
    }

    fn target_dimension(&self) -> usize {
        self.target_dimension
    }

    fn state(&self) -> ProviderState {
        self.lifecycle.state()
    }

    async fn initialize(&self) -> Result<()> {
        if !self.lifecycle.begin()? {
            return Ok(());
        }

        info!(url = %self.base_url, "Connecting to TEI embeddings server");
        let outcome = self.connect().await;
        self.lifecycle.complete(&self.connection, outcome)?;

        info!(
            url = %self.base_url,
            model = self.model_id().unwrap_or(UNKNOWN_MODEL),
            dimensions = self.target_dimension,
            batch_size = self.config.batch_size,
            "TEI embeddings provider initialized"
        );
        Ok(())
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let connection = self.lifecycle.ready(&self.connection)?;
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (index, chunk) in texts.chunks(batch_size).enumerate() {
            debug!(chunk = index, size = chunk.len(), "Sending TEI embed request");

            let vectors = self
                .retry
                .run("tei embed", || self.embed_chunk(&connection.client, chunk))
                .await?;

            check_vectors(&vectors, chunk.len(), self.target_dimension)?;
            all_embeddings.extend(vectors);
        }

        Ok(all_embeddings)
    }
}
