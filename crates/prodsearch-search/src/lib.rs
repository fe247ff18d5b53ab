//! prodsearch-search - Semantic product search over a vector index
//!
//! Turns free-text queries into ranked, deduplicated product lists:
//!
//! - **Embeddings**: query text to a dense vector (local Candle models or an
//!   OpenAI-compatible endpoint)
//! - **Vector index**: kNN query against Elasticsearch or Qdrant
//! - **Deduplication**: first-seen wins on (ProductName, Description),
//!   preserving index rank order
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use prodsearch_search::{
//!     create_index, create_provider, ElasticsearchConfig, EmbeddingConfig, IndexConfig,
//!     ProductSearcher, SearchOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> prodsearch_search::Result<()> {
//!     let index = create_index(&IndexConfig::Elasticsearch(ElasticsearchConfig::default()))?;
//!     let provider = create_provider(&EmbeddingConfig::default())?;
//!     let searcher = ProductSearcher::new(provider, index, SearchOptions::default())?;
//!
//!     for hit in searcher.search_text("blue running shoes", Some(10)).await? {
//!         println!("{:.3} {:?}", hit.score, hit.fields.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod orchestrator;
pub mod types;

pub use dedup::{dedupe, DedupKey};
pub use error::{Result, SearchError, SearchErrorKind};
pub use index::{
    create_index, ElasticsearchConfig, ElasticsearchIndex, IndexBackendType, IndexConfig,
    KnnQuery, QdrantIndex, QdrantIndexConfig, VectorIndex,
};
pub use orchestrator::{num_candidates_for, ProductSearcher, SearchOptions, SearchPhase};
pub use types::{
    CandidateHit, EmbeddingVector, ProductFields, SearchQuery, SearchResult, PRODUCT_FIELDS,
};

pub use embeddings::{
    create_provider, validate_dimension, validate_model, Embedder, EmbeddingConfig, EmbeddingProvider,
    EmbeddingProviderType, LocalProvider, ModelRegistry, OpenAIConfig, OpenAIProvider,
    ProviderStatus,
};
