//! BERT sentence encoder loaded from the HuggingFace Hub with Candle
//!
//! Downloads `config.json`, `tokenizer.json` and `model.safetensors` (plus the
//! sentence-transformers pooling config when the repo has one), builds a
//! [`BertModel`], pools token states and L2-normalizes the result.
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};

/// Data type for model inference
const DTYPE: DType = DType::F32;

/// Pooling config written by sentence-transformers
const POOLING_CONFIG: &str = "1_Pooling/config.json";

/// An in-process sentence embedding model
pub trait SentenceModel: Send + Sync {
    /// Native output width
    fn dimension(&self) -> usize;

    /// One vector per text, in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Produces a [`SentenceModel`] for a model identifier
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_id: &str) -> Result<Box<dyn SentenceModel>>;
}

/// How token states are reduced to one vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// First (`[CLS]`) token
    Cls,
    /// Attention-masked mean over all tokens
    Mean,
}

#[derive(Debug, Default, Deserialize)]
struct PoolingConfig {
    #[serde(default)]
    pooling_mode_cls_token: bool,
}

impl Pooling {
    fn from_config(config: &PoolingConfig) -> Self {
        if config.pooling_mode_cls_token {
            Pooling::Cls
        } else {
            Pooling::Mean
        }
    }
}

/// Encoder fields needed outside Candle
#[derive(Debug, Deserialize)]
struct EncoderShape {
    hidden_size: usize,
    #[serde(default = "default_max_positions")]
    max_position_embeddings: usize,
}

fn default_max_positions() -> usize {
    512
}

/// Loads BERT-family models from the HuggingFace Hub
#[derive(Debug, Clone, Default)]
pub struct HubModelLoader {
    device: Option<Device>,
}

impl HubModelLoader {
    /// Device is selected automatically at load time: Metal > CUDA > CPU
    pub fn new() -> Self {
        Self::default()
    }

    /// Load onto a specific device
    pub fn with_device(device: Device) -> Self {
        Self {
            device: Some(device),
        }
    }
}

impl ModelLoader for HubModelLoader {
    fn load(&self, model_id: &str) -> Result<Box<dyn SentenceModel>> {
        let device = self.device.clone().unwrap_or_else(select_device);
        let model = BertSentenceModel::load(model_id, &device)?;
        Ok(Box::new(model))
    }
}

/// Loaded BERT encoder with its tokenizer
pub struct BertSentenceModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pooling: Pooling,
    dimension: usize,
}

impl BertSentenceModel {
    /// Download (or reuse cached) files for `model_id` and build the encoder
    pub fn load(model_id: &str, device: &Device) -> anyhow::Result<Self> {
        info!(model = model_id, "Loading local embedding model");
        let start = Instant::now();

        let api = Api::new().context("Failed to create HF API")?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            "main".to_string(),
        ));

        let config_path = fetch(&repo, "config.json")?;
        let tokenizer_path = fetch(&repo, "tokenizer.json")?;
        let weights_path = fetch(&repo, "model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse model config")?;
        let shape: EncoderShape =
            serde_json::from_str(&config_str).context("Failed to parse model config")?;

        let pooling = match repo.get(POOLING_CONFIG) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let pooling_config: PoolingConfig =
                    serde_json::from_str(&raw).context("Failed to parse pooling config")?;
                Pooling::from_config(&pooling_config)
            }
            Err(e) => {
                debug!(model = model_id, "No pooling config ({}), using mean pooling", e);
                Pooling::Mean
            }
        };

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: shape.max_position_embeddings,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device) }
            .context("Failed to load weights")?;
        let model = BertModel::load(vb, &config).context("Failed to create model")?;

        info!(
            model = model_id,
            dimension = shape.hidden_size,
            pooling = ?pooling,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Local embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            pooling,
            dimension: shape.hidden_size,
        })
    }

    fn forward(&self, texts: &[String]) -> Result<Tensor> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| EmbeddingError::Inference(format!("Tokenization failed: {}", e)))?;

        let token_ids = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let attention_masks = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let token_ids = Tensor::stack(&token_ids, 0)?;
        let attention_mask = Tensor::stack(&attention_masks, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = match self.pooling {
            Pooling::Cls => hidden.i((.., 0))?,
            Pooling::Mean => mean_pool(&hidden, &attention_mask)?,
        };
        Ok(normalize_l2(&pooled)?)
    }
}

impl SentenceModel for BertSentenceModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!("Encoding {} texts with local model", texts.len());
        Ok(self.forward(texts)?.to_vec2::<f32>()?)
    }
}

/// Select the best available device for inference
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal/MPS GPU acceleration");
                return device;
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
            }
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU acceleration");
                return device;
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
            }
        }
    }

    info!("Using CPU (no GPU acceleration available)");
    Device::Cpu
}

fn fetch(repo: &ApiRepo, file: &str) -> anyhow::Result<PathBuf> {
    repo.get(file)
        .with_context(|| format!("Failed to download {}", file))
}

/// L2 normalize each row
fn normalize_l2(v: &Tensor) -> candle_core::Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)
}

/// Mean pooling with attention mask
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    summed.broadcast_div(&mask.sum(1)?)
}
