//! Embedding provider trait and types
//!
//! Two implementations ship with the crate:
//! - `LocalProvider` - Candle-based local inference (CPU/Metal/CUDA)
//! - `OpenAIProvider` - OpenAI-compatible APIs (OpenAI, Azure OpenAI, Ollama)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type of embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// Local inference using Candle (CPU/Metal/CUDA)
    #[default]
    Local,
    /// OpenAI-compatible API
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProviderType::Local => write!(f, "local"),
            EmbeddingProviderType::Openai => write!(f, "openai"),
        }
    }
}

/// Status of an embedding provider
///
/// Contains health and capability information for diagnostics.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Whether the provider is available and responding
    pub available: bool,
    /// Type of provider
    pub provider_type: EmbeddingProviderType,
    /// Device/endpoint being used ("CPU", "Metal", "CUDA", "Remote")
    pub device: String,
    /// Last health check latency in milliseconds
    pub latency_ms: Option<u64>,
    /// Whether the model is loaded and ready to encode
    pub model_ready: bool,
    /// Error message if provider is unavailable
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Create a status for a healthy provider
    pub fn healthy(provider_type: EmbeddingProviderType, device: impl Into<String>) -> Self {
        Self {
            available: true,
            provider_type,
            device: device.into(),
            latency_ms: None,
            model_ready: true,
            error: None,
        }
    }

    /// Create a status for an unavailable provider
    pub fn unavailable(provider_type: EmbeddingProviderType, error: impl Into<String>) -> Self {
        Self {
            available: false,
            provider_type,
            device: "N/A".into(),
            latency_ms: None,
            model_ready: false,
            error: Some(error.into()),
        }
    }

    /// Set latency from a health check
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.available && self.model_ready
    }
}

/// Embedding provider trait
///
/// All methods are async to support both local (spawn_blocking) and remote
/// (HTTP) providers. Implementations must be `Send + Sync`; one provider is
/// shared by every in-flight search.
///
/// # Example
///
/// ```ignore
/// use prodsearch_search::embeddings::EmbeddingProvider;
///
/// async fn example(provider: &dyn EmbeddingProvider) -> prodsearch_search::Result<()> {
///     let embeddings = provider.encode(vec!["floral summer dress".to_string()]).await?;
///     assert_eq!(embeddings[0].len(), provider.embedding_dim());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for natural language text
    ///
    /// Returns one vector per input, in input order, each with
    /// `embedding_dim()` dimensions. Repeated calls with the same text
    /// return identical vectors.
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Check provider connectivity and status
    ///
    /// For local providers, checks model availability.
    /// For remote providers, performs a health check request.
    async fn check_status(&self) -> Result<ProviderStatus>;

    /// Warm up the provider
    ///
    /// For local providers, loads the model into memory.
    /// For remote providers, establishes connections and measures latency.
    async fn warmup(&self) -> Result<()>;

    /// Dimensionality of generated embeddings
    fn embedding_dim(&self) -> usize;

    fn provider_type(&self) -> EmbeddingProviderType;

    /// Identifier of the model producing embeddings
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_display() {
        assert_eq!(EmbeddingProviderType::Local.to_string(), "local");
        assert_eq!(EmbeddingProviderType::Openai.to_string(), "openai");
    }

    #[test]
    fn test_provider_status_healthy() {
        let status = ProviderStatus::healthy(EmbeddingProviderType::Local, "CPU").with_latency(12);
        assert!(status.is_ready());
        assert_eq!(status.latency_ms, Some(12));
        assert!(status.error.is_none());
    }

    #[test]
    fn test_provider_status_unavailable() {
        let status = ProviderStatus::unavailable(EmbeddingProviderType::Openai, "connection refused");
        assert!(!status.is_ready());
        assert_eq!(status.device, "N/A");
        assert_eq!(status.error.as_deref(), Some("connection refused"));
    }
}
