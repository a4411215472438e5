//! Embedding provider trait and lifecycle types
//!
//! Defines the contract shared by every backend:
//! - `LocalProvider` - in-process BERT-family model (Candle)
//! - `TeiProvider` - Text Embeddings Inference server
//! - `OpenAIProvider` - OpenAI-compatible hosted API, including both Azure routes

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use once_cell::sync::OnceCell;

pub use hindsight_config::EmbeddingProviderType;

use crate::error::{EmbeddingError, Result};

/// Lifecycle state of a provider instance
///
/// `Uninitialized → Initializing → Ready`, or `Failed`. `Failed` is terminal:
/// the provider must be reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderState::Uninitialized => write!(f, "uninitialized"),
            ProviderState::Initializing => write!(f, "initializing"),
            ProviderState::Ready => write!(f, "ready"),
            ProviderState::Failed => write!(f, "failed"),
        }
    }
}

/// Embedding provider trait
///
/// Core abstraction for turning text into fixed-width vectors. Callers construct a
/// provider through the factory, call [`initialize`](Self::initialize) once, then
/// call [`encode`](Self::encode) as often as needed.
///
/// # Guarantees
///
/// - `encode(texts)` returns exactly `texts.len()` vectors, in input order.
/// - Every vector has exactly `target_dimension()` components. A backend that
///   produces anything else surfaces [`EmbeddingError::DimensionMismatch`].
/// - `encode(vec![])` returns an empty list without touching the backend.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync`; network-backed providers share one pooled
/// HTTP client across concurrent `encode` calls. The local provider shares one
/// model handle, so concurrent calls compete for the same compute.
///
/// # Example
///
/// ```ignore
/// use hindsight_embeddings::{create_provider, EmbeddingsConfig};
///
/// let provider = create_provider(&EmbeddingsConfig::local())?;
/// provider.initialize().await?;
/// let vectors = provider.encode(vec!["hello world".to_string()]).await?;
/// assert_eq!(vectors[0].len(), provider.target_dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable, human-readable backend name ("local", "tei", "openai")
    fn provider_name(&self) -> &'static str;

    /// Backend kind
    fn provider_type(&self) -> EmbeddingProviderType;

    /// Width every produced vector must have
    fn target_dimension(&self) -> usize;

    /// Current lifecycle state
    fn state(&self) -> ProviderState;

    /// Prepare the provider to serve `encode`
    ///
    /// Loads the model or opens the HTTP client, and confirms the backend's output
    /// width matches `target_dimension()`. Returns immediately if already `Ready`.
    /// On failure the provider becomes `Failed`.
    async fn initialize(&self) -> Result<()>;

    /// Generate one vector per input text, in input order
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Lifecycle bookkeeping shared by the provider implementations.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    provider: &'static str,
    state: Mutex<ProviderState>,
}

impl Lifecycle {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            state: Mutex::new(ProviderState::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ProviderState {
        *self.lock()
    }

    /// Enter `Initializing`.
    ///
    /// Returns `Ok(false)` when the provider is already `Ready` and nothing needs doing.
    pub(crate) fn begin(&self) -> Result<bool> {
        let mut state = self.lock();
        match *state {
            ProviderState::Ready => Ok(false),
            ProviderState::Failed => Err(EmbeddingError::ProviderFailed {
                provider: self.provider,
            }),
            ProviderState::Uninitialized | ProviderState::Initializing => {
                *state = ProviderState::Initializing;
                Ok(true)
            }
        }
    }

    /// Record the outcome of an initialization attempt.
    ///
    /// On success the resources are stored in `slot` before the state flips to `Ready`.
    pub(crate) fn complete<T>(&self, slot: &OnceCell<T>, outcome: Result<T>) -> Result<()> {
        match outcome {
            Ok(resources) => {
                // A concurrent initializer may have won; either value is equivalent.
                let _ = slot.set(resources);
                *self.lock() = ProviderState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.lock() = ProviderState::Failed;
                Err(e)
            }
        }
    }

    /// Borrow the ready resources, or report that `initialize` has not succeeded.
    pub(crate) fn ready<'a, T>(&self, slot: &'a OnceCell<T>) -> Result<&'a T> {
        match (self.state(), slot.get()) {
            (ProviderState::Ready, Some(resources)) => Ok(resources),
            _ => Err(EmbeddingError::Uninitialized {
                provider: self.provider,
            }),
        }
    }
}

/// Check that a backend returned one vector per input and that each has the target width
pub(crate) fn check_vectors(vectors: &[Vec<f32>], inputs: usize, expected: usize) -> Result<()> {
    if vectors.len() != inputs {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            inputs,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }
    Ok(())
}
