//! Provider factory for creating embedding providers from configuration

use std::sync::Arc;

use crate::error::{Result, SearchError};

use super::local::{LocalProvider, DEFAULT_MODEL_ID};
use super::openai::{OpenAIConfig, OpenAIProvider};
use super::provider::{EmbeddingProvider, EmbeddingProviderType};

/// Configuration for embedding providers
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Which provider to use
    pub provider: EmbeddingProviderType,
    /// HuggingFace model id (used when provider = Local)
    pub local_model: String,
    /// OpenAI provider settings (used when provider = Openai)
    pub openai: Option<OpenAIConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::local(DEFAULT_MODEL_ID)
    }
}

impl EmbeddingConfig {
    /// Config for the local provider
    pub fn local(model_id: impl Into<String>) -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            local_model: model_id.into(),
            openai: None,
        }
    }

    /// Config for an OpenAI-compatible provider
    pub fn openai(config: OpenAIConfig) -> Self {
        Self {
            provider: EmbeddingProviderType::Openai,
            local_model: DEFAULT_MODEL_ID.to_string(),
            openai: Some(config),
        }
    }
}

/// Check that a provider produces vectors of the index dimensionality
pub fn validate_dimension(provider: &dyn EmbeddingProvider, expected: usize) -> Result<()> {
    let actual = provider.embedding_dim();
    if actual != expected {
        return Err(SearchError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Check that a provider runs the model the index vectors were built with.
///
/// Ids compare case-insensitively, and a bare name matches its
/// organisation-qualified form (`all-mpnet-base-v2` matches
/// `sentence-transformers/all-mpnet-base-v2`). An empty `expected` skips the
/// check.
pub fn validate_model(provider: &dyn EmbeddingProvider, expected: &str) -> Result<()> {
    let actual = provider.model_id();
    if expected.is_empty() || same_model(actual, expected) {
        return Ok(());
    }
    Err(SearchError::ModelMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn same_model(a: &str, b: &str) -> bool {
    let bare = |id: &str| id.rsplit('/').next().unwrap_or(id).to_ascii_lowercase();
    if a.contains('/') && b.contains('/') {
        a.eq_ignore_ascii_case(b)
    } else {
        bare(a) == bare(b)
    }
}

/// Create an embedding provider from configuration
///
/// Returns an `Arc<dyn EmbeddingProvider>` that can be shared across
/// async tasks and threads. No model is loaded and no request is sent.
pub fn create(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderType::Local => Arc::new(LocalProvider::new(config.local_model.clone())),
        EmbeddingProviderType::Openai => {
            let Some(ref openai_config) = config.openai else {
                return Err(SearchError::InvalidConfig(
                    "openai provider selected without endpoint settings".into(),
                ));
            };
            Arc::new(OpenAIProvider::new(openai_config.clone())?)
        }
    };

    Ok(provider)
}
