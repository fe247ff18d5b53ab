//! Local embedding provider using Candle and Jina models
//!
//! Runs JinaBERT sentence-embedding models (default: Jina Embeddings v2
//! Base EN, 768 dimensions) in-process. Weights are fetched from the
//! HuggingFace Hub on first use and kept in a [`ModelRegistry`].
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::jina_bert::{BertModel as JinaBertModel, Config as JinaConfig};
use hf_hub::{api::sync::Api, Repo, RepoType};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};
use tracing::{debug, info};

use crate::error::{Result, SearchError};

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};

/// Default model on HuggingFace Hub
pub const DEFAULT_MODEL_ID: &str = "jinaai/jina-embeddings-v2-base-en";

/// Dimension of the default model
pub const DEFAULT_DIM: usize = 768;

/// Data type for model inference
const DTYPE: DType = DType::F32;

static GLOBAL_REGISTRY: Lazy<Arc<ModelRegistry>> =
    Lazy::new(|| Arc::new(ModelRegistry::new(select_device())));

/// Loaded JinaBERT model with its tokenizer
pub struct LoadedModel {
    model: JinaBertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl LoadedModel {
    pub fn dim(&self) -> usize {
        self.dim
    }
}

type ModelSlot = Arc<OnceCell<Arc<LoadedModel>>>;

/// Thread-safe cache of loaded models keyed by model id.
///
/// Each model id owns a `OnceCell`, so concurrent first use of the same
/// model performs a single load and every caller observes the finished
/// model. A failed load leaves the slot empty and the next call retries.
pub struct ModelRegistry {
    device: Device,
    slots: Mutex<HashMap<String, ModelSlot>>,
}

impl ModelRegistry {
    /// Create an empty registry that loads models onto `device`
    pub fn new(device: Device) -> Self {
        Self {
            device,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry shared by providers created with
    /// [`LocalProvider::new`].
    pub fn global() -> Arc<ModelRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn slot(&self, model_id: &str) -> ModelSlot {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(model_id.to_string()).or_default())
    }

    /// Return the model for `model_id`, loading it on first use.
    ///
    /// Blocks while weights download and load; call from a blocking context.
    pub fn get_or_load(&self, model_id: &str) -> Result<Arc<LoadedModel>> {
        // The registry lock is released before loading so other models stay usable
        let slot = self.slot(model_id);
        let model = slot.get_or_try_init(|| load_model(model_id, &self.device).map(Arc::new))?;
        Ok(Arc::clone(model))
    }

    /// Whether `model_id` is loaded
    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.slots
            .lock()
            .get(model_id)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Ids of all loaded models
    pub fn loaded_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop the cached model for `model_id`.
    ///
    /// Searches already holding the model finish with it; the memory is
    /// released when the last of them completes. Returns whether a loaded
    /// model was evicted.
    pub fn evict(&self, model_id: &str) -> bool {
        let removed = self.slots.lock().remove(model_id);
        let evicted = removed.is_some_and(|slot| slot.get().is_some());
        if evicted {
            info!("Evicted embedding model {}", model_id);
        }
        evicted
    }

    /// Drop every cached model. Returns the number of loaded models evicted.
    pub fn clear(&self) -> usize {
        let drained: Vec<ModelSlot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        let count = drained.iter().filter(|slot| slot.get().is_some()).count();
        if count > 0 {
            info!("Evicted {} embedding model(s)", count);
        }
        count
    }
}

/// Local embedding provider using Candle for inference
///
/// Uses `Arc<LocalProviderInner>` for interior clonability, which is required
/// for `spawn_blocking` to move the provider into the blocking task.
#[derive(Clone)]
pub struct LocalProvider {
    inner: Arc<LocalProviderInner>,
}

struct LocalProviderInner {
    model_id: String,
    registry: Arc<ModelRegistry>,
    expected_dim: usize,
}

impl LocalProvider {
    /// Create a provider for `model_id` backed by the process-wide registry
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_registry(model_id, ModelRegistry::global())
    }

    /// Create a provider backed by an explicitly owned registry
    pub fn with_registry(model_id: impl Into<String>, registry: Arc<ModelRegistry>) -> Self {
        let model_id = model_id.into();
        let expected_dim = known_dimension(&model_id).unwrap_or(DEFAULT_DIM);
        Self {
            inner: Arc::new(LocalProviderInner {
                model_id,
                registry,
                expected_dim,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.inner.registry
    }

    /// Whether this provider's model is loaded
    pub fn is_loaded(&self) -> bool {
        self.inner.registry.is_loaded(&self.inner.model_id)
    }

    fn device_name(&self) -> String {
        match self.inner.registry.device() {
            Device::Cpu => "CPU".to_string(),
            #[cfg(feature = "metal")]
            Device::Metal(_) => "Metal".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(_) => "CUDA".to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unknown".to_string(),
        }
    }

    fn encode_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        debug!("Encoding {} texts with {}", texts.len(), self.inner.model_id);

        let model = self.inner.registry.get_or_load(&self.inner.model_id)?;
        encode_with_model(&model, &texts)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = self.clone();
        tokio::task::spawn_blocking(move || provider.encode_sync(&texts))
            .await
            .map_err(|e| SearchError::Embedding(format!("Blocking task panicked: {}", e)))?
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        let loaded = self.is_loaded();
        let available = loaded || check_model_cached(&self.inner.model_id).is_ok();

        Ok(ProviderStatus {
            available,
            provider_type: EmbeddingProviderType::Local,
            device: self.device_name(),
            latency_ms: None,
            model_ready: loaded,
            error: (!available).then(|| {
                format!("Model {} not available - download required", self.inner.model_id)
            }),
        })
    }

    async fn warmup(&self) -> Result<()> {
        let provider = self.clone();
        let start = Instant::now();

        tokio::task::spawn_blocking(move || {
            provider.inner.registry.get_or_load(&provider.inner.model_id)
        })
        .await
        .map_err(|e| SearchError::Embedding(format!("Warmup task panicked: {}", e)))??;

        info!("LocalProvider warmup complete in {:?}", start.elapsed());
        Ok(())
    }

    fn embedding_dim(&self) -> usize {
        self.inner
            .registry
            .slots
            .lock()
            .get(&self.inner.model_id)
            .and_then(|slot| slot.get().map(|model| model.dim))
            .unwrap_or(self.inner.expected_dim)
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_id(&self) -> &str {
        &self.inner.model_id
    }
}

/// Output dimension of known JinaBERT checkpoints
pub fn known_dimension(model_id: &str) -> Option<usize> {
    match model_id {
        "jinaai/jina-embeddings-v2-base-en" => Some(768),
        "jinaai/jina-embeddings-v2-small-en" => Some(512),
        _ => None,
    }
}

/// Select the best available device for inference
fn select_device() -> Device {
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

/// Check if model files are reachable on the hub
fn check_model_cached(model_id: &str) -> std::result::Result<(), String> {
    let api = Api::new().map_err(|e| format!("HuggingFace API unavailable: {}", e))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());

    api.repo(repo)
        .info()
        .map(|_| ())
        .map_err(|e| format!("Model not available: {}", e))
}

/// Download model files from HuggingFace Hub
fn download_model_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let api = Api::new()
        .map_err(|e| SearchError::Embedding(format!("Failed to create HF API: {}", e)))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    let api_repo = api.repo(repo);

    let fetch = |file: &str| {
        api_repo
            .get(file)
            .map_err(|e| SearchError::Embedding(format!("Failed to download {}: {}", file, e)))
    };

    Ok((
        fetch("config.json")?,
        fetch("tokenizer.json")?,
        fetch("model.safetensors")?,
    ))
}

fn load_model(model_id: &str, device: &Device) -> Result<LoadedModel> {
    info!("Loading embedding model ({})...", model_id);
    let start = Instant::now();

    let (config_path, tokenizer_path, weights_path) = download_model_files(model_id)?;

    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| SearchError::Embedding(format!("Failed to read config: {}", e)))?;
    let config: JinaConfig = serde_json::from_str(&config_str)
        .map_err(|e| SearchError::Embedding(format!("Failed to parse config: {}", e)))?;

    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| SearchError::Embedding(format!("Failed to load tokenizer: {}", e)))?;

    // SAFETY: the safetensors file lives in the hub cache and is not modified while mapped
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)
            .map_err(|e| SearchError::Embedding(format!("Failed to load weights: {}", e)))?
    };

    let model = JinaBertModel::new(vb, &config)
        .map_err(|e| SearchError::Embedding(format!("Failed to create model: {}", e)))?;

    info!(
        "Embedding model {} loaded (dim={}) in {:?}",
        model_id,
        config.hidden_size,
        start.elapsed()
    );

    Ok(LoadedModel {
        model,
        tokenizer,
        device: device.clone(),
        dim: config.hidden_size,
    })
}

/// L2 normalize embeddings
fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)
        .map_err(|e| SearchError::Embedding(format!("L2 normalization failed: {}", e)))
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;
    let summed = embeddings.broadcast_mul(&mask)?.sum(1)?;

    summed
        .broadcast_div(&mask.sum(1)?)
        .map_err(|e| SearchError::Embedding(format!("Mean pooling failed: {}", e)))
}

fn encode_with_model(loaded: &LoadedModel, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let mut tokenizer = loaded.tokenizer.clone();
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| SearchError::Embedding(format!("Tokenization failed: {}", e)))?;

    let token_ids = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_ids(), &loaded.device))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let attention_masks = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_attention_mask(), &loaded.device))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let token_ids = Tensor::stack(&token_ids, 0)?;
    let attention_mask = Tensor::stack(&attention_masks, 0)?;

    let embeddings = loaded
        .model
        .forward(&token_ids)
        .map_err(|e| SearchError::Embedding(format!("Forward pass failed: {}", e)))?;

    let normalized = normalize_l2(&mean_pool(&embeddings, &attention_mask)?)?;

    let vectors = (0..normalized.dim(0)?)
        .map(|i| normalized.get(i)?.to_vec1::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(vectors)
}
