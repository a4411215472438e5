//! Request routing for the OpenAI-compatible provider
//!
//! Three mutually exclusive request shapes share one wire format:
//!
//! | Route | URL | Auth header | Body |
//! |---|---|---|---|
//! | `AzureV1` | `{base}/embeddings` | `api-key` | `model`, `input`, `dimensions` |
//! | `AzureDeployments` | `{base}/openai/deployments/{dep}/embeddings?api-version=…` | `api-key` | `input`, `dimensions` |
//! | `OpenAi` | `{base}/embeddings` | `Authorization: Bearer` | `model`, `input`, `dimensions` |
//!
//! The route is resolved once from [`OpenAIConfig`] and fixed for the provider's lifetime.

use hindsight_config::{env, OpenAIConfig, DEFAULT_OPENAI_BASE_URL};

use crate::error::{EmbeddingError, Result};

/// Path segment that marks an Azure OpenAI v1-style base URL
const AZURE_V1_SEGMENT: &str = "/openai/v1";

/// Azure AI Foundry resource host
const AZURE_FOUNDRY_HOST: &str = "services.ai.azure.com";

/// Azure OpenAI resource host
const AZURE_OPENAI_HOST: &str = "openai.azure.com";

/// Resolved request route for the hosted API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Public (or self-hosted) OpenAI-compatible API with bearer auth
    OpenAi { base_url: String },
    /// Azure OpenAI v1 endpoint; the model name selects the deployment
    AzureV1 { base_url: String },
    /// Azure resource endpoint addressed by deployment name and API version
    AzureDeployments {
        base_url: String,
        deployment: String,
        api_version: String,
    },
}

/// How the credential is attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>`
    ApiKey,
}

impl Route {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Route::OpenAi { .. } => "openai",
            Route::AzureV1 { .. } => "azure-v1",
            Route::AzureDeployments { .. } => "azure-deployments",
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Route::OpenAi { base_url }
            | Route::AzureV1 { base_url }
            | Route::AzureDeployments { base_url, .. } => base_url,
        }
    }

    /// Full embeddings endpoint, without query string
    pub fn embeddings_url(&self) -> String {
        match self {
            Route::OpenAi { base_url } | Route::AzureV1 { base_url } => {
                format!("{}/embeddings", base_url)
            }
            Route::AzureDeployments {
                base_url,
                deployment,
                ..
            } => format!(
                "{}/openai/deployments/{}/embeddings",
                base_url, deployment
            ),
        }
    }

    /// Query parameters appended to every request
    pub fn query(&self) -> Option<(&'static str, &str)> {
        match self {
            Route::AzureDeployments { api_version, .. } => Some(("api-version", api_version)),
            _ => None,
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Route::OpenAi { .. } => AuthScheme::Bearer,
            Route::AzureV1 { .. } | Route::AzureDeployments { .. } => AuthScheme::ApiKey,
        }
    }

    /// Whether the request body carries `model`; deployments select it by URL
    pub fn sends_model(&self) -> bool {
        !matches!(self, Route::AzureDeployments { .. })
    }
}

fn is_azure_v1(lower_base: &str) -> bool {
    (lower_base.contains(AZURE_FOUNDRY_HOST) || lower_base.contains(AZURE_OPENAI_HOST))
        && lower_base.contains(AZURE_V1_SEGMENT)
}

/// Pick the request route for `config`, validating it against `target_dimension`
///
/// Runs before any network activity. Every failure is an
/// [`EmbeddingError::Configuration`] naming the offending setting.
pub fn resolve_route(config: &OpenAIConfig, target_dimension: usize) -> Result<Route> {
    if config.api_key.as_deref().map_or(true, str::is_empty) {
        return Err(EmbeddingError::Configuration(format!(
            "{} is required when {} is 'openai'",
            env::API_KEY,
            env::PROVIDER
        )));
    }

    let mut base_url = config
        .base_url
        .as_deref()
        .map(|b| b.trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_OPENAI_BASE_URL)
        .to_string();

    let mut lower_base = base_url.to_lowercase();
    let mut azure_v1 = is_azure_v1(&lower_base);

    // Foundry resource endpoint given without the v1 path
    if lower_base.contains(AZURE_FOUNDRY_HOST) && !lower_base.contains(AZURE_V1_SEGMENT) {
        base_url.push_str(AZURE_V1_SEGMENT);
        lower_base = base_url.to_lowercase();
        azure_v1 = is_azure_v1(&lower_base);
    }

    if config.dimensions != target_dimension {
        return Err(EmbeddingError::Configuration(format!(
            "Embeddings dimensions mismatch: configured {}, but schema requires {}. \
             Either set {}={} or migrate the database schema and re-embed.",
            config.dimensions,
            target_dimension,
            env::DIMENSIONS,
            target_dimension
        )));
    }

    let deployment = config
        .azure_deployment
        .as_deref()
        .filter(|d| !d.is_empty());

    if azure_v1 {
        if deployment.is_some() {
            return Err(EmbeddingError::Configuration(format!(
                "Do not set {} when using an OpenAI v1 base URL ({} contains {}). \
                 Set the embeddings deployment name via {} instead.",
                env::AZURE_DEPLOYMENT,
                env::BASE_URL,
                AZURE_V1_SEGMENT,
                env::MODEL
            )));
        }
        return Ok(Route::AzureV1 { base_url });
    }

    if let Some(deployment) = deployment {
        let api_version = config
            .azure_api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                EmbeddingError::Configuration(format!(
                    "{} is required when {} is set",
                    env::AZURE_API_VERSION,
                    env::AZURE_DEPLOYMENT
                ))
            })?;

        if base_url.ends_with("/v1") {
            return Err(EmbeddingError::Configuration(format!(
                "{} for Azure should be the resource endpoint (no /v1). Got: {}",
                env::BASE_URL,
                base_url
            )));
        }

        return Ok(Route::AzureDeployments {
            base_url,
            deployment: deployment.to_string(),
            api_version: api_version.to_string(),
        });
    }

    Ok(Route::OpenAi { base_url })
}
