//! Query embedding front for the search pipeline

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SearchError};
use crate::types::EmbeddingVector;

use super::provider::EmbeddingProvider;

/// Turns query text into an [`EmbeddingVector`] of a fixed dimensionality.
///
/// Wraps a shared provider. Blank text is rejected before the provider is
/// touched, and every provider failure surfaces as
/// [`SearchError::ModelUnavailable`].
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Expected vector length
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        if text.trim().is_empty() {
            return Err(SearchError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vectors = self
            .provider
            .encode(vec![text.to_string()])
            .await
            .map_err(|e| match e {
                SearchError::ModelUnavailable(_) | SearchError::DimensionMismatch { .. } => e,
                other => SearchError::ModelUnavailable(format!(
                    "{} ({})",
                    other,
                    self.provider.model_id()
                )),
            })?;

        let vector = match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => vector,
            _ => {
                return Err(SearchError::ModelUnavailable(format!(
                    "{} returned an unexpected number of embeddings",
                    self.provider.model_id()
                )))
            }
        };

        if vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        debug!(dim = vector.len(), model = self.provider.model_id(), "Embedded query");
        Ok(EmbeddingVector::new(vector))
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.provider_type())
            .field("model", &self.provider.model_id())
            .field("dimension", &self.dimension)
            .finish()
    }
}
