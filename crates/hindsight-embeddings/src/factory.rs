//! Provider factory for creating embedding providers from configuration
//!
//! Maps a resolved [`EmbeddingsConfig`] onto one of the three provider
//! implementations. Construction performs no I/O; call
//! [`EmbeddingProvider::initialize`] on the result before encoding.

use std::sync::Arc;

use hindsight_config::{EmbeddingsConfig, EmbeddingsSettings, ProviderConfig};
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::local::LocalProvider;
use crate::openai::OpenAIProvider;
use crate::provider::EmbeddingProvider;
use crate::tei::TeiProvider;

/// Create an embedding provider from configuration
///
/// Returns an `Arc<dyn EmbeddingProvider>` that can be shared across
/// async tasks and threads.
///
/// # Example
///
/// ```ignore
/// use hindsight_embeddings::{create_provider, EmbeddingsConfig};
///
/// let provider = create_provider(&EmbeddingsConfig::local())?;
/// provider.initialize().await?;
/// println!("Using {} provider", provider.provider_type());
/// ```
pub fn create(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.target_dimension == 0 {
        return Err(EmbeddingError::Configuration(
            "target dimension must be greater than 0".into(),
        ));
    }

    let target_dimension = config.target_dimension;
    let provider: Arc<dyn EmbeddingProvider> = match &config.provider {
        ProviderConfig::Local(local) => Arc::new(LocalProvider::new(local.clone(), target_dimension)),
        ProviderConfig::Tei(tei) => {
            check_batch_size("TEI", tei.batch_size)?;
            Arc::new(TeiProvider::new(tei.clone(), target_dimension))
        }
        ProviderConfig::OpenAi(openai) => {
            check_batch_size("OpenAI", openai.batch_size)?;
            Arc::new(OpenAIProvider::new(openai.clone(), target_dimension))
        }
    };

    debug!(
        provider = provider.provider_name(),
        target_dimension, "Created embeddings provider"
    );
    Ok(provider)
}

/// Create a provider from `HINDSIGHT_API_EMBEDDINGS_*` environment variables
pub fn create_from_env() -> Result<Arc<dyn EmbeddingProvider>> {
    let config = EmbeddingsSettings::from_env()?.resolve()?;
    create(&config)
}

fn check_batch_size(provider: &str, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(EmbeddingError::Configuration(format!(
            "{} batch size must be greater than 0",
            provider
        )));
    }
    Ok(())
}
