//! Local embedding provider
//!
//! Runs a sentence model in-process. The model is loaded once by
//! [`initialize`](EmbeddingProvider::initialize) and shared by every `encode`
//! call; inference runs on the blocking thread pool.
//!
//! Failures here are not transient, so nothing is retried.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::info;

use hindsight_config::LocalConfig;

use crate::bert::{HubModelLoader, ModelLoader, SentenceModel};
use crate::error::{EmbeddingError, Result};
use crate::provider::{
    check_vectors, EmbeddingProvider, EmbeddingProviderType, Lifecycle, ProviderState,
};

/// Local embedding provider
///
/// Uses `Arc<LocalProviderInner>` so that `spawn_blocking` can move a handle
/// into the blocking task.
#[derive(Clone)]
pub struct LocalProvider {
    inner: Arc<LocalProviderInner>,
}

struct LocalProviderInner {
    model_id: String,
    target_dimension: usize,
    loader: Box<dyn ModelLoader>,
    lifecycle: Lifecycle,
    model: OnceCell<Box<dyn SentenceModel>>,
}

impl LocalProvider {
    /// Provider that downloads the configured model from the HuggingFace Hub
    pub fn new(config: LocalConfig, target_dimension: usize) -> Self {
        Self::with_loader(config, target_dimension, HubModelLoader::new())
    }

    /// Provider with a custom model loader
    pub fn with_loader(
        config: LocalConfig,
        target_dimension: usize,
        loader: impl ModelLoader + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(LocalProviderInner {
                model_id: config.model_id,
                target_dimension,
                loader: Box::new(loader),
                lifecycle: Lifecycle::new("local"),
                model: OnceCell::new(),
            }),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.inner.model_id
    }

    fn load_model(&self) -> Result<Box<dyn SentenceModel>> {
        let inner = &self.inner;
        let model = inner.loader.load(&inner.model_id)?;

        let dimension = model.dimension();
        if dimension != inner.target_dimension {
            return Err(EmbeddingError::Configuration(format!(
                "Local model '{}' produces {}-dimensional embeddings, but schema requires {}. \
                 Choose a model with {} dimensions or migrate the database schema and re-embed.",
                inner.model_id, dimension, inner.target_dimension, inner.target_dimension
            )));
        }
        Ok(model)
    }

    /// Synchronous encoding (internal)
    fn encode_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = &self.inner;
        let model = inner.lifecycle.ready(&inner.model)?;
        let vectors = model.embed(texts)?;
        check_vectors(&vectors, texts.len(), inner.target_dimension)?;
        Ok(vectors)
    }
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("model_id", &self.inner.model_id)
            .field("target_dimension", &self.inner.target_dimension)
            .field("state", &self.inner.lifecycle.state())
            .finish()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn target_dimension(&self) -> usize {
        self.inner.target_dimension
    }

    fn state(&self) -> ProviderState {
        self.inner.lifecycle.state()
    }

    async fn initialize(&self) -> Result<()> {
        if !self.inner.lifecycle.begin()? {
            return Ok(());
        }

        info!(model = %self.inner.model_id, "Initializing local embeddings provider");
        let provider = self.clone();
        let outcome = tokio::task::spawn_blocking(move || provider.load_model())
            .await
            .unwrap_or_else(|e| {
                Err(EmbeddingError::Inference(format!(
                    "Model load task panicked: {}",
                    e
                )))
            });
        self.inner.lifecycle.complete(&self.inner.model, outcome)?;

        info!(
            model = %self.inner.model_id,
            dimensions = self.inner.target_dimension,
            "Local embeddings provider initialized"
        );
        Ok(())
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.inner.lifecycle.ready(&self.inner.model)?;
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let provider = self.clone();
        tokio::task::spawn_blocking(move || provider.encode_sync(&texts))
            .await
            .map_err(|e| EmbeddingError::Inference(format!("Blocking task panicked: {}", e)))?
    }
}
