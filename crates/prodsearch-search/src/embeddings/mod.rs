//! Query embedding generation
//!
//! ```text
//! Embedder                    - validation + error translation
//!     └── EmbeddingProvider (trait)
//!             ├── LocalProvider   - Candle + JinaBERT, models cached in ModelRegistry
//!             └── OpenAIProvider  - HTTP client for /v1/embeddings
//! ```
//!
//! # Example
//!
//! ```ignore
//! use prodsearch_search::embeddings::{create_provider, Embedder, EmbeddingConfig};
//!
//! let provider = create_provider(&EmbeddingConfig::default())?;
//! let embedder = Embedder::new(provider, 768);
//! let vector = embedder.embed("waterproof hiking jacket").await?;
//! ```

mod embedder;
pub mod factory;
mod local;
pub mod openai;
mod provider;

pub use embedder::Embedder;
pub use factory::{create as create_provider, validate_dimension, validate_model, EmbeddingConfig};
pub use local::{known_dimension, LoadedModel, LocalProvider, ModelRegistry, DEFAULT_DIM, DEFAULT_MODEL_ID};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
