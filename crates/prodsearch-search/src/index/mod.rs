//! Vector index clients
//!
//! ```text
//! VectorIndex (trait)
//!     ├── ElasticsearchIndex - top-level `knn` search over HTTP/JSON
//!     └── QdrantIndex        - `search_points` over gRPC
//! ```
//!
//! Clients translate transport and server failures into three outcomes:
//! [`SearchError::IndexUnreachable`] and [`SearchError::Timeout`] are worth
//! one retry, [`SearchError::QueryRejected`] never is.

mod elasticsearch;
mod qdrant;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchIndex};
pub use qdrant::{QdrantIndex, QdrantIndexConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::{CandidateHit, EmbeddingVector};

/// Vector index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendType {
    #[default]
    Elasticsearch,
    Qdrant,
}

impl std::fmt::Display for IndexBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexBackendType::Elasticsearch => write!(f, "elasticsearch"),
            IndexBackendType::Qdrant => write!(f, "qdrant"),
        }
    }
}

/// One approximate nearest-neighbour request.
#[derive(Debug, Clone, Copy)]
pub struct KnnQuery<'a> {
    /// Query embedding
    pub vector: &'a EmbeddingVector,
    /// Number of hits to return
    pub k: usize,
    /// Candidates each shard examines before picking the top `k`
    pub num_candidates: usize,
    /// Source fields to project onto each hit
    pub fields: &'a [&'a str],
}

impl KnnQuery<'_> {
    /// Reject query shapes the index would refuse
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if self.vector.len() != dimension {
            return Err(SearchError::QueryRejected(format!(
                "query vector has {} dimensions, index expects {}",
                self.vector.len(),
                dimension
            )));
        }
        if self.k == 0 {
            return Err(SearchError::QueryRejected("k must be at least 1".into()));
        }
        if self.num_candidates < self.k {
            return Err(SearchError::QueryRejected(format!(
                "num_candidates ({}) must be at least k ({})",
                self.num_candidates, self.k
            )));
        }
        Ok(())
    }
}

/// Client for an already-built vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Run a kNN query.
    ///
    /// Hits come back in the order the index ranked them, best first.
    async fn query(&self, query: KnnQuery<'_>) -> Result<Vec<CandidateHit>>;

    /// Round-trip a lightweight request and report its latency
    async fn ping(&self) -> Result<Duration>;

    /// Configured dimensionality of the vector field
    fn dimension(&self) -> usize;

    fn backend_type(&self) -> IndexBackendType;
}

/// Backend selection plus its connection settings
#[derive(Debug, Clone)]
pub enum IndexConfig {
    Elasticsearch(ElasticsearchConfig),
    Qdrant(QdrantIndexConfig),
}

/// Create an index client from configuration.
///
/// No request is sent; connectivity problems surface on first use.
pub fn create_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config {
        IndexConfig::Elasticsearch(es) => Arc::new(ElasticsearchIndex::new(es.clone())?),
        IndexConfig::Qdrant(qd) => Arc::new(QdrantIndex::new(qd.clone())?),
    };
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PRODUCT_FIELDS;

    #[test]
    fn test_knn_query_validation() {
        let vector = EmbeddingVector::new(vec![0.0; 4]);
        let query = KnnQuery {
            vector: &vector,
            k: 20,
            num_candidates: 500,
            fields: &PRODUCT_FIELDS,
        };
        assert!(query.validate(4).is_ok());
        assert!(matches!(
            query.validate(768),
            Err(SearchError::QueryRejected(_))
        ));

        let bad = KnnQuery { k: 0, ..query };
        assert!(bad.validate(4).is_err());

        let bad = KnnQuery {
            num_candidates: 10,
            ..query
        };
        assert!(bad.validate(4).is_err());
    }

    #[test]
    fn test_create_index_selects_backend() {
        let es = create_index(&IndexConfig::Elasticsearch(ElasticsearchConfig::default())).unwrap();
        assert_eq!(es.backend_type(), IndexBackendType::Elasticsearch);
        assert_eq!(es.dimension(), 768);
    }

    #[tokio::test]
    async fn test_create_qdrant_index() {
        let qd = create_index(&IndexConfig::Qdrant(QdrantIndexConfig::default())).unwrap();
        assert_eq!(qd.backend_type(), IndexBackendType::Qdrant);
    }
}
