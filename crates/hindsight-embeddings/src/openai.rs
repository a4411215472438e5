//! OpenAI-compatible embedding provider
//!
//! Serves the public OpenAI API, OpenAI-compatible gateways and both Azure styles.
//! The request route is picked once at initialization by [`resolve_route`]; see
//! [`crate::routing`] for the URL, header and body shape of each route.
//!
//! # Endpoint Format
//!
//! - POST `{base_url}/embeddings` (or the Azure deployments path)
//! - Request: `{"model": "...", "input": ["text1", ...], "dimensions": 384}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...], ...}`
//!
//! Items in `data` are re-sorted by `index`; the API does not promise submission order.
//!
//! # Example
//!
//! ```ignore
//! use hindsight_embeddings::{OpenAIConfig, OpenAIProvider};
//!
//! let config = OpenAIConfig::new(std::env::var("OPENAI_API_KEY")?)
//!     .with_model("text-embedding-3-small");
//! let provider = OpenAIProvider::new(config, 384);
//! provider.initialize().await?;
//! let embeddings = provider.encode(vec!["hello world".into()]).await?;
//! ```

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hindsight_config::OpenAIConfig;

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingProviderType, Lifecycle, ProviderState};
use crate::retry::RetryPolicy;
use crate::routing::{resolve_route, AuthScheme, Route};

/// Request body for the embeddings endpoint
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
    dimensions: usize,
}

/// Single embedding in the response
#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Response from the embeddings endpoint
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// Resources available once initialized
#[derive(Debug)]
struct Connection {
    client: Client,
    route: Route,
}

/// Hosted API provider for OpenAI-compatible embeddings endpoints
#[derive(Debug)]
pub struct OpenAIProvider {
    config: OpenAIConfig,
    target_dimension: usize,
    retry: RetryPolicy,
    lifecycle: Lifecycle,
    connection: OnceCell<Connection>,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, target_dimension: usize) -> Self {
        let retry = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        Self {
            config,
            target_dimension,
            retry,
            lifecycle: Lifecycle::new("openai"),
            connection: OnceCell::new(),
        }
    }

    /// Route selected during initialization
    pub fn route(&self) -> Option<&Route> {
        self.connection.get().map(|c| &c.route)
    }

    fn connect(&self) -> Result<Connection> {
        let route = resolve_route(&self.config, self.target_dimension)?;
        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Connectivity(format!("HTTP client error: {}", e)))?;
        Ok(Connection { client, route })
    }

    /// Send one chunk and return its vectors in input order
    async fn send_request(&self, connection: &Connection, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let route = &connection.route;
        let body = EmbeddingsRequest {
            model: route.sends_model().then_some(self.config.model.as_str()),
            input: texts,
            dimensions: self.config.dimensions,
        };

        let mut request = connection
            .client
            .post(route.embeddings_url())
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(query) = route.query() {
            request = request.query(&[query]);
        }

        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        request = match route.auth_scheme() {
            AuthScheme::ApiKey => request.header("api-key", api_key),
            AuthScheme::Bearer => request.header("Authorization", format!("Bearer {}", api_key)),
        };

        let response = request.send().await.map_err(EmbeddingError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::from_status(status, body));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::from_transport(e)
            } else {
                EmbeddingError::InvalidResponse(format!("missing or malformed 'data' list: {}", e))
            }
        })?;

        reorder(parsed.data, texts.len(), self.target_dimension)
    }
}

/// Validate item widths and indices, then sort into input order
fn reorder(mut items: Vec<EmbeddingData>, inputs: usize, expected: usize) -> Result<Vec<Vec<f32>>> {
    if let Some(bad) = items.iter().find(|item| item.embedding.len() != expected) {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: bad.embedding.len(),
        });
    }

    items.sort_by_key(|item| item.index);

    let contiguous = items.len() == inputs
        && items
            .iter()
            .enumerate()
            .all(|(position, item)| item.index == position);
    if !contiguous {
        let indices: Vec<usize> = items.iter().map(|item| item.index).collect();
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected indices 0..{}, got {:?}",
            inputs, indices
        )));
    }

    Ok(items.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Openai
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

        let outcome = self.connect();
        self.lifecycle.complete(&self.connection, outcome)?;

        if let Some(route) = self.route() {
            info!(
                route = route.name(),
                url = %route.base_url(),
                model = %self.config.model,
                dimensions = self.config.dimensions,
                "OpenAI-compatible embeddings provider initialized"
            );
        }
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
            debug!(
                chunk = index,
                size = chunk.len(),
                route = connection.route.name(),
                "Sending embeddings request"
            );

            let vectors = self
                .retry
                .run("openai embeddings", || self.send_request(connection, chunk))
                .await?;
            all_embeddings.extend(vectors);
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIM: usize = 4;

    /// Response whose items carry the given indices; each vector is filled with its index
    fn mock_response(indices: &[usize], dim: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = indices
            .iter()
            .map(|&i| {
                serde_json::json!({
                    "object": "embedding",
                    "embedding": vec![i as f32; dim],
                    "index": i
                })
            })
            .collect();

        serde_json::json!({
            "object": "list",
            "data": data,
            "model": "test-model",
            "usage": {"prompt_tokens": 10, "total_tokens": 10}
        })
    }

    fn texts(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("text {}", i)).collect()
    }

    fn test_config(server: &MockServer) -> OpenAIConfig {
        OpenAIConfig::new("test-key")
            .with_base_url(format!("{}/v1", server.uri()))
            .with_model("test-model")
            .with_dimensions(DIM)
            .with_timeout(Duration::from_secs(5))
    }

    async fn ready_provider(config: OpenAIConfig) -> OpenAIProvider {
        let provider = OpenAIProvider::new(config, DIM);
        provider.initialize().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn test_plain_route_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "input": ["hello world"],
                "dimensions": DIM
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], DIM)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        assert_eq!(provider.route().map(Route::name), Some("openai"));

        let result = provider.encode(vec!["hello world".into()]).await.unwrap();
        assert_eq!(result, vec![vec![0.0; DIM]]);
    }

    #[tokio::test]
    async fn test_deployments_route_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openai/deployments/emb-small/embeddings"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "test-key"))
            .and(body_json(serde_json::json!({
                "input": ["hello"],
                "dimensions": DIM
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], DIM)))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server)
            .with_base_url(server.uri())
            .with_azure_deployment("emb-small", Some("2024-02-01".into()));
        let provider = ready_provider(config).await;
        assert_eq!(provider.route().map(Route::name), Some("azure-deployments"));

        let result = provider.encode(vec!["hello".into()]).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_azure_v1_route_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/res.openai.azure.com/openai/v1/embeddings"))
            .and(header("api-key", "test-key"))
            .and(body_json(serde_json::json!({
                "model": "emb-deployment",
                "input": ["hello"],
                "dimensions": DIM
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], DIM)))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server)
            .with_base_url(format!("{}/res.openai.azure.com/openai/v1/", server.uri()))
            .with_model("emb-deployment");
        let provider = ready_provider(config).await;
        assert_eq!(provider.route().map(Route::name), Some("azure-v1"));

        let result = provider.encode(vec!["hello".into()]).await.unwrap();
        assert_eq!(result.len(), 1);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_out_of_order_items_are_sorted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[2, 0, 1], DIM)))
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(3)).await.unwrap();

        assert_eq!(
            result,
            vec![vec![0.0; DIM], vec![1.0; DIM], vec![2.0; DIM]]
        );
    }

    #[tokio::test]
    async fn test_chunks_concatenate_in_order() {
        let server = MockServer::start().await;
        let input = texts(3);

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "input": &input[0..2],
                "dimensions": DIM
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[1, 0], DIM)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "input": &input[2..3],
                "dimensions": DIM
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": vec![9.0_f32; DIM]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server).with_batch_size(2)).await;
        let result = provider.encode(input).await.unwrap();

        assert_eq!(
            result,
            vec![vec![0.0; DIM], vec![1.0; DIM], vec![9.0; DIM]]
        );
    }

    #[tokio::test]
    async fn test_missing_data_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"object": "list"})),
            )
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(1)).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_item_without_index_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": vec![0.0_f32; DIM]}]
            })))
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(1)).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_wrong_width_is_dimension_mismatch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], 3072)))
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(1)).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: DIM,
                actual: 3072
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_item_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0, 2], DIM)))
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(2)).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_auth_failure_is_client_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server).with_retries(3, Duration::from_millis(1));
        let provider = ready_provider(config).await;
        let result = provider.encode(texts(1)).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Client { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_server_error_not_retried_by_default() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        let result = provider.encode(texts(1)).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Server { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_optional_retry_recovers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], DIM)))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server).with_retries(2, Duration::from_millis(1));
        let provider = ready_provider(config).await;
        assert_eq!(provider.encode(texts(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], DIM)))
            .expect(0)
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        assert!(provider.encode(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encode_before_initialize() {
        let server = MockServer::start().await;
        let provider = OpenAIProvider::new(test_config(&server), DIM);

        assert!(matches!(
            provider.encode(texts(1)).await,
            Err(EmbeddingError::Uninitialized { provider: "openai" })
        ));
    }

    #[tokio::test]
    async fn test_initialize_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let provider = ready_provider(test_config(&server)).await;
        assert_eq!(provider.state(), ProviderState::Ready);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_initialize() {
        let config = OpenAIConfig::new("test-key").with_dimensions(3072);
        let provider = OpenAIProvider::new(config, 384);

        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Configuration(_)));
        let msg = err.to_string();
        assert!(msg.contains("3072"));
        assert!(msg.contains("384"));
        assert_eq!(provider.state(), ProviderState::Failed);
        assert!(provider.route().is_none());
    }

    #[tokio::test]
    async fn test_foundry_endpoint_routes_as_v1() {
        let config = OpenAIConfig::new("test-key")
            .with_base_url("https://my-res.services.ai.azure.com")
            .with_model("emb-deployment");
        let provider = OpenAIProvider::new(config, 384);
        provider.initialize().await.unwrap();

        let route = provider.route().unwrap();
        assert_eq!(
            route,
            &Route::AzureV1 {
                base_url: "https://my-res.services.ai.azure.com/openai/v1".into()
            }
        );
        assert_eq!(route.auth_scheme(), AuthScheme::ApiKey);
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAIProvider::new(OpenAIConfig::new("sk-secret"), 384);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_reorder_rejects_duplicate_indices() {
        let items = vec![
            EmbeddingData {
                index: 0,
                embedding: vec![0.0; 2],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0; 2],
            },
        ];
        assert!(matches!(
            reorder(items, 2, 2),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }
}
