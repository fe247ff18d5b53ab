//! prodsearch configuration management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.prodsearch/config.toml`
//! - Local config: `.prodsearch/config.toml` (in the working directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.
//! Secrets are never stored in the file itself; sections reference them
//! by environment variable name (`api_key_env`).

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Root configuration for prodsearch.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProdsearchConfig {
    /// Vector index connection settings
    pub index: IndexConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Search pipeline tuning
    pub search: SearchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Vector index backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackendType {
    /// Elasticsearch kNN search over HTTP/JSON (default)
    #[default]
    Elasticsearch,
    /// Qdrant vector database over gRPC
    Qdrant,
}

impl std::fmt::Display for IndexBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Elasticsearch => write!(f, "elasticsearch"),
            Self::Qdrant => write!(f, "qdrant"),
        }
    }
}

impl std::str::FromStr for IndexBackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "elasticsearch" | "es" | "elastic" => Ok(Self::Elasticsearch),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::invalid_value(
                "index.backend",
                format!(
                    "unknown index backend '{}'. Valid values: elasticsearch, qdrant",
                    s
                ),
            )),
        }
    }
}

/// Vector index configuration.
///
/// # Example TOML
///
/// ```toml
/// [index]
/// backend = "elasticsearch"
/// url = "https://my-deployment.es.io:443"
/// api_key_env = "ELASTIC_API_KEY"
/// index_name = "all_products"
/// vector_field = "DescriptionVector"
/// dimension = 768
/// embedding_model = "sentence-transformers/all-mpnet-base-v2"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Which backend serves the index
    pub backend: IndexBackendType,

    /// Index endpoint URL
    pub url: String,

    /// Environment variable holding the API key (None = no authentication)
    pub api_key_env: Option<String>,

    /// Index (Elasticsearch) or collection (Qdrant) name
    pub index_name: String,

    /// Name of the dense vector field holding description embeddings
    pub vector_field: String,

    /// Configured dimensionality of the vector field
    pub dimension: u32,

    /// Model the stored vectors were built with. Query embeddings must come
    /// from the same model; empty skips the check.
    pub embedding_model: String,

    /// Transport-level request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackendType::default(),
            url: "http://localhost:9200".to_string(),
            api_key_env: None,
            index_name: "all_products".to_string(),
            vector_field: "DescriptionVector".to_string(),
            dimension: 768,
            embedding_model: CATALOG_EMBEDDING_MODEL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Model behind the `DescriptionVector` field of the default catalog index.
pub const CATALOG_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";

impl IndexConfig {
    /// Resolve the API key from the referenced environment variable.
    ///
    /// Returns `Ok(None)` when no variable is configured. A configured but
    /// unset variable is an error.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        resolve_secret("index.api_key_env", self.api_key_env.as_deref())
    }

    /// Validate index settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::invalid_value("index.url", "must not be empty"));
        }
        if self.index_name.is_empty() {
            return Err(ConfigError::invalid_value(
                "index.index_name",
                "must not be empty",
            ));
        }
        if self.backend == IndexBackendType::Elasticsearch && self.vector_field.is_empty() {
            return Err(ConfigError::invalid_value(
                "index.vector_field",
                "must not be empty",
            ));
        }
        if self.dimension == 0 {
            return Err(ConfigError::invalid_value(
                "index.dimension",
                "must be greater than 0",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "index.timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Embedding provider configuration.
///
/// # Example TOML
///
/// ```toml
/// [embedding]
/// provider = "openai"  # or "local"
/// local_model = "jinaai/jina-embeddings-v2-base-en"
///
/// # text-embeddings-inference serving the catalog model
/// [embedding.openai]
/// url = "http://localhost:8080/v1"
/// model = "sentence-transformers/all-mpnet-base-v2"
/// ```
///
/// The local provider runs JinaBERT models only, so it suits indexes built
/// with one of those. The default catalog index needs the OpenAI-compatible
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which embedding provider to use
    pub provider: EmbeddingProviderType,

    /// HuggingFace model id for the local provider
    pub local_model: String,

    /// OpenAI-compatible provider settings (required when provider = "openai")
    pub openai: Option<OpenAISettings>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::default(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            openai: Some(OpenAISettings::default()),
        }
    }
}

/// Default model for the local provider (768-dimensional).
pub const DEFAULT_LOCAL_MODEL: &str = "jinaai/jina-embeddings-v2-base-en";

impl EmbeddingConfig {
    /// Validate that required settings exist for the selected provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            EmbeddingProviderType::Local => {
                if self.local_model.is_empty() {
                    return Err(ConfigError::invalid_value(
                        "embedding.local_model",
                        "must not be empty",
                    ));
                }
                Ok(())
            }
            EmbeddingProviderType::Openai => {
                let Some(settings) = self.openai.as_ref() else {
                    return Err(ConfigError::invalid_value(
                        "embedding.openai",
                        "provider is 'openai' but [embedding.openai] section is missing",
                    ));
                };
                if settings.url.is_empty() {
                    return Err(ConfigError::invalid_value(
                        "embedding.openai.url",
                        "is required",
                    ));
                }
                if settings.model.is_empty() {
                    return Err(ConfigError::invalid_value(
                        "embedding.openai.model",
                        "is required",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Identifier of the model that will produce query embeddings.
    pub fn model_id(&self) -> &str {
        match self.provider {
            EmbeddingProviderType::Local => &self.local_model,
            EmbeddingProviderType::Openai => self
                .openai
                .as_ref()
                .map(|s| s.model.as_str())
                .unwrap_or(""),
        }
    }
}

/// Embedding provider type selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// Local provider using Candle
    Local,
    /// OpenAI-compatible API (OpenAI, Azure OpenAI, Ollama, text-embeddings-inference) (default)
    #[default]
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Openai => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::Openai),
            _ => Err(ConfigError::invalid_value(
                "embedding.provider",
                format!("unknown embedding provider '{}'. Valid values: local, openai", s),
            )),
        }
    }
}

/// OpenAI-compatible provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub url: String,

    /// Environment variable name containing the API key (None = no auth)
    pub api_key_env: Option<String>,

    /// Embedding model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retry attempts inside the provider
    pub max_retries: u32,

    /// Use Azure OpenAI authentication (api-key header)
    pub azure_mode: bool,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1".to_string(),
            api_key_env: None,
            model: CATALOG_EMBEDDING_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 2,
            azure_mode: false,
        }
    }
}

impl OpenAISettings {
    /// Resolve the API key from the referenced environment variable.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        resolve_secret("embedding.openai.api_key_env", self.api_key_env.as_deref())
    }
}

/// Search pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results returned when the caller does not ask for a count (N)
    pub default_limit: usize,

    /// Candidates requested from the index (K); raised to N when smaller
    pub default_candidates: usize,

    /// Deadline for a single embedding call, in seconds
    pub embed_timeout_secs: u64,

    /// Deadline for a single index query attempt, in seconds
    pub query_timeout_secs: u64,

    /// Maximum number of searches in flight against the index
    pub max_concurrent_searches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_candidates: 20,
            embed_timeout_secs: 30,
            query_timeout_secs: 10,
            max_concurrent_searches: 8,
        }
    }
}

impl SearchConfig {
    /// Validate search settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit == 0 {
            return Err(ConfigError::invalid_value(
                "search.default_limit",
                "must be at least 1",
            ));
        }
        if self.default_candidates < self.default_limit {
            return Err(ConfigError::invalid_value(
                "search.default_candidates",
                format!(
                    "must be at least default_limit ({}), got {}",
                    self.default_limit, self.default_candidates
                ),
            ));
        }
        if self.embed_timeout_secs == 0 || self.query_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "search.*_timeout_secs",
                "timeouts must be greater than 0",
            ));
        }
        if self.max_concurrent_searches == 0 {
            return Err(ConfigError::invalid_value(
                "search.max_concurrent_searches",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override index URL
    pub index_url: Option<String>,

    /// Override index backend
    pub index_backend: Option<IndexBackendType>,

    /// Override embedding provider type
    pub embedding_provider: Option<EmbeddingProviderType>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override default result count
    pub default_limit: Option<usize>,
}

impl ProdsearchConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref url) = overrides.index_url {
            self.index.url = url.clone();
        }

        if let Some(backend) = overrides.index_backend {
            self.index.backend = backend;
        }

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
            if provider == EmbeddingProviderType::Openai && self.embedding.openai.is_none() {
                self.embedding.openai = Some(OpenAISettings::default());
            }
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(limit) = overrides.default_limit {
            self.search.default_limit = limit;
            if self.search.default_candidates < limit {
                self.search.default_candidates = limit;
            }
        }
    }

    /// Render the configuration as TOML, in the same layout as the files on disk.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.index.validate()?;
        self.embedding.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

fn resolve_secret(key: &str, var: Option<&str>) -> Result<Option<String>, ConfigError> {
    let Some(var) = var else {
        return Ok(None);
    };
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ => Err(ConfigError::missing_secret(key, var)),
    }
}
