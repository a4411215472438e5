//! Hindsight Embeddings - backend-agnostic text embeddings with a fixed width
//!
//! Turns text into vectors for the memory store. Every provider produces vectors
//! of exactly the configured target dimension, or fails loudly.
//!
//! # Providers
//!
//! - **Local** - in-process BERT model via Candle (CPU/Metal/CUDA)
//! - **TEI** - HuggingFace Text Embeddings Inference server, chunked with retry
//! - **OpenAI** - OpenAI-compatible hosted API, including Azure v1 and
//!   Azure deployments routing
//!
//! ```text
//! EmbeddingProvider (trait)
//!     ├── LocalProvider    - Candle + BERT sentence model
//!     ├── TeiProvider      - HTTP client for /info and /embed
//!     └── OpenAIProvider   - HTTP client for /embeddings
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hindsight_embeddings::{create_provider, ConfigLoader, EmbeddingProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load()?;
//!     let provider = create_provider(&config)?;
//!     provider.initialize().await?;
//!
//!     let vectors = provider.encode(vec!["Alice moved to Berlin".into()]).await?;
//!     assert_eq!(vectors[0].len(), provider.target_dimension());
//!     Ok(())
//! }
//! ```

pub mod bert;
pub mod error;
pub mod factory;
mod local;
pub mod openai;
mod provider;
pub mod retry;
pub mod routing;
pub mod tei;

// Re-export provider types
pub use provider::{EmbeddingProvider, EmbeddingProviderType, ProviderState};

// Re-export factory functions
pub use factory::{create as create_provider, create_from_env};

pub use bert::{HubModelLoader, ModelLoader, SentenceModel};
pub use error::{EmbeddingError, Result};
pub use local::LocalProvider;
pub use openai::OpenAIProvider;
pub use retry::RetryPolicy;
pub use routing::{resolve_route, AuthScheme, Route};
pub use tei::TeiProvider;

// Re-export configuration types
pub use hindsight_config::{
    ConfigError, ConfigLoader, EmbeddingsConfig, EmbeddingsSettings, LocalConfig, OpenAIConfig,
    ProviderConfig, TeiConfig, EMBEDDING_DIMENSION,
};
