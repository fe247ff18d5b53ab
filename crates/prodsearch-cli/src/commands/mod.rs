//! CLI command implementations

pub mod config;
pub mod search;
pub mod status;
pub mod tips;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prodsearch_config::{ConfigLoader, ProdsearchConfig};
use prodsearch_search::{
    create_index, create_provider, ElasticsearchConfig, EmbeddingConfig as SearchEmbeddingConfig,
    validate_model, EmbeddingProvider, IndexConfig as SearchIndexConfig, OpenAIConfig,
    ProductSearcher, QdrantIndexConfig, SearchOptions, VectorIndex,
};

use crate::GlobalOptions;

/// Directory whose `.prodsearch/config.toml` is merged over the global config.
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

/// Load configuration and apply CLI overrides.
///
/// An explicit `--config` file replaces the global/local merge.
pub fn load_config(global: &GlobalOptions) -> Result<ProdsearchConfig> {
    let overrides = global.to_config_overrides();
    let mut loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        return loader
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    loader
        .load(&working_dir()?, Some(&overrides))
        .context("Failed to load configuration")
}

/// Convert prodsearch_config's index section to the search crate's backend config.
pub fn to_search_index_config(config: &ProdsearchConfig) -> Result<SearchIndexConfig> {
    use prodsearch_config::IndexBackendType;

    let index = &config.index;
    let api_key = index
        .resolve_api_key()
        .context("Failed to resolve index API key")?;

    Ok(match index.backend {
        IndexBackendType::Elasticsearch => SearchIndexConfig::Elasticsearch(ElasticsearchConfig {
            url: index.url.clone(),
            api_key,
            index_name: index.index_name.clone(),
            vector_field: index.vector_field.clone(),
            dimension: index.dimension as usize,
            timeout_secs: index.timeout_secs,
        }),
        IndexBackendType::Qdrant => SearchIndexConfig::Qdrant(QdrantIndexConfig {
            url: index.url.clone(),
            api_key,
            collection: index.index_name.clone(),
            dimension: index.dimension as usize,
            timeout_secs: index.timeout_secs,
        }),
    })
}

/// Convert prodsearch_config's embedding section to the search crate's provider config.
pub fn to_search_embedding_config(config: &ProdsearchConfig) -> Result<SearchEmbeddingConfig> {
    use prodsearch_config::EmbeddingProviderType;

    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingProviderType::Local => Ok(SearchEmbeddingConfig::local(&embedding.local_model)),
        EmbeddingProviderType::Openai => {
            let settings = embedding.openai.clone().unwrap_or_default();
            let api_key = settings
                .resolve_api_key()
                .context("Failed to resolve embedding API key")?;

            let openai = OpenAIConfig::with_endpoint(&settings.url, api_key, &settings.model)
                .with_timeout(settings.timeout_secs)
                .with_max_retries(settings.max_retries)
                .with_azure_mode(settings.azure_mode);
            Ok(SearchEmbeddingConfig::openai(openai))
        }
    }
}

/// Pipeline tuning from the `[search]` section.
pub fn to_search_options(config: &ProdsearchConfig) -> SearchOptions {
    let search = &config.search;
    SearchOptions {
        default_limit: search.default_limit,
        default_candidates: search.default_candidates,
        embed_timeout: Duration::from_secs(search.embed_timeout_secs),
        query_timeout: Duration::from_secs(search.query_timeout_secs),
        max_concurrent: search.max_concurrent_searches,
    }
}

/// Create the vector index client.
pub fn build_index(config: &ProdsearchConfig) -> Result<Arc<dyn VectorIndex>> {
    create_index(&to_search_index_config(config)?).context("Failed to create index client")
}

/// Create the embedding provider. No model is loaded yet.
pub fn build_provider(config: &ProdsearchConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    create_provider(&to_search_embedding_config(config)?)
        .context("Failed to create embedding provider")
}

/// Validate the configuration and wire up a searcher.
pub fn build_searcher(config: &ProdsearchConfig) -> Result<ProductSearcher> {
    config.validate().context("Invalid configuration")?;

    let index = build_index(config)?;
    let provider = build_provider(config)?;
    validate_model(provider.as_ref(), &config.index.embedding_model)
        .context("Query embeddings would not match the index vectors")?;
    ProductSearcher::new(provider, index, to_search_options(config))
        .context("Failed to create searcher")
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodsearch_config::{EmbeddingProviderType, IndexBackendType, OpenAISettings};
    use prodsearch_search::EmbeddingProviderType as SearchProviderType;

    #[test]
    fn test_default_config_maps_to_elasticsearch() {
        let config = ProdsearchConfig::default();
        match to_search_index_config(&config).unwrap() {
            SearchIndexConfig::Elasticsearch(es) => {
                assert_eq!(es.url, "http://localhost:9200");
                assert_eq!(es.index_name, "all_products");
                assert_eq!(es.vector_field, "DescriptionVector");
                assert_eq!(es.dimension, 768);
                assert!(es.api_key.is_none());
            }
            other => panic!("expected Elasticsearch, got {other:?}"),
        }
    }

    #[test]
    fn test_qdrant_backend_uses_index_name_as_collection() {
        let mut config = ProdsearchConfig::default();
        config.index.backend = IndexBackendType::Qdrant;
        config.index.url = "http://localhost:6334".to_string();

        match to_search_index_config(&config).unwrap() {
            SearchIndexConfig::Qdrant(qd) => {
                assert_eq!(qd.collection, "all_products");
                assert_eq!(qd.url, "http://localhost:6334");
            }
            other => panic!("expected Qdrant, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_index_secret_is_an_error() {
        let mut config = ProdsearchConfig::default();
        config.index.api_key_env = Some("PRODSEARCH_CLI_TEST_UNSET_KEY".to_string());
        assert!(to_search_index_config(&config).is_err());
    }

    #[test]
    fn test_openai_embedding_mapping() {
        let mut config = ProdsearchConfig::default();
        config.embedding.provider = EmbeddingProviderType::Openai;
        config.embedding.openai = Some(OpenAISettings {
            url: "http://embeddings.internal/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 5,
            ..Default::default()
        });

        let mapped = to_search_embedding_config(&config).unwrap();
        assert_eq!(mapped.provider, SearchProviderType::Openai);
        let openai = mapped.openai.unwrap();
        assert_eq!(openai.base_url, "http://embeddings.internal/v1");
        assert_eq!(openai.model, "text-embedding-3-small");
        assert_eq!(openai.timeout_secs, 5);
    }

    #[test]
    fn test_search_options_follow_config() {
        let mut config = ProdsearchConfig::default();
        config.search.default_limit = 5;
        config.search.query_timeout_secs = 3;

        let options = to_search_options(&config);
        assert_eq!(options.default_limit, 5);
        assert_eq!(options.default_candidates, 20);
        assert_eq!(options.query_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_default_config_builds_searcher() {
        let searcher = build_searcher(&ProdsearchConfig::default()).unwrap();
        assert_eq!(
            searcher.embedder().provider().model_id(),
            "sentence-transformers/all-mpnet-base-v2"
        );
    }

    #[test]
    fn test_build_searcher_rejects_mismatched_model() {
        let mut config = ProdsearchConfig::default();
        config.embedding.provider = EmbeddingProviderType::Local;

        let err = build_searcher(&config).unwrap_err();
        let cause = err.downcast_ref::<prodsearch_search::SearchError>().unwrap();
        assert_eq!(cause.kind(), prodsearch_search::SearchErrorKind::BadQuery);

        config.index.embedding_model = config.embedding.local_model.clone();
        assert!(build_searcher(&config).is_ok());
    }

    #[test]
    fn test_build_searcher_rejects_invalid_config() {
        let mut config = ProdsearchConfig::default();
        config.search.default_candidates = 1;
        assert!(build_searcher(&config).is_err());
    }
}
