//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.prodsearch/config.toml`
//! 2. Local config: `.prodsearch/config.toml` (in the working directory)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, ProdsearchConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".prodsearch";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".prodsearch";

/// One config file as written, before defaults are filled in.
///
/// Layers merge key by key, so a later file wins for exactly the keys it
/// sets, including keys set back to their default value.
type Layer = toml::Table;

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.prodsearch`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config layer
    global_layer: Option<Layer>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.prodsearch`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_layer: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_layer: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a directory.
    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a directory with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ProdsearchConfig, ConfigError> {
        let mut merged = Layer::new();
        let mut source = PathBuf::from(CONFIG_FILE_NAME);

        if let Some(global) = self.global_layer()? {
            merge_layers(&mut merged, global);
            source = self.global_config_path().unwrap_or(source);
        }

        let local_path = self.local_config_path(root);
        if let Some(local) = read_optional_layer(&local_path)? {
            merge_layers(&mut merged, local);
            source = local_path;
        }

        let mut config = into_config(merged, &source)?;
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load a single explicit config file on top of defaults, then apply overrides.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ProdsearchConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = into_config(read_layer(path)?, path)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<ProdsearchConfig>, ConfigError> {
        let Some(layer) = self.global_layer()? else {
            return Ok(None);
        };
        let path = self.global_config_path().unwrap_or_default();
        into_config(layer, &path).map(Some)
    }

    /// Load only the local configuration for a directory.
    pub fn load_local(&self, root: &Path) -> Result<Option<ProdsearchConfig>, ConfigError> {
        let local_path = self.local_config_path(root);
        match read_optional_layer(&local_path)? {
            Some(layer) => into_config(layer, &local_path).map(Some),
            None => Ok(None),
        }
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &ProdsearchConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a directory.
    pub fn save_local(&self, root: &Path, config: &ProdsearchConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(root), config)
    }

    /// Initialize global configuration.
    ///
    /// Creates `~/.prodsearch/config.toml` with default configuration if absent.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        init_config_file(global_dir)
    }

    /// Initialize local configuration for a directory.
    ///
    /// Creates `.prodsearch/config.toml` with default configuration if absent.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&root.join(LOCAL_CONFIG_DIR))
    }

    /// Clear cached global configuration.
    pub fn clear_cache(&mut self) {
        self.global_layer = None;
    }

    /// The global layer, read once and cached.
    fn global_layer(&mut self) -> Result<Option<Layer>, ConfigError> {
        if let Some(ref layer) = self.global_layer {
            return Ok(Some(layer.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        let layer = read_optional_layer(&global_path)?;
        self.global_layer = layer.clone();
        Ok(layer)
    }
}

fn init_config_file(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }

    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        save_config_file(&config_path, &ProdsearchConfig::default())?;
    }

    Ok(config_path)
}

fn read_optional_layer(path: &Path) -> Result<Option<Layer>, ConfigError> {
    if !path.exists() {
        trace!("Config not found at {:?}", path);
        return Ok(None);
    }

    debug!("Loading config from {:?}", path);
    read_layer(path).map(Some)
}

/// Read a configuration file and check it against the schema on its own,
/// so type errors name the file they came from.
fn read_layer(path: &Path) -> Result<Layer, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let layer: Layer = toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    into_config(layer.clone(), path)?;
    Ok(layer)
}

fn into_config(layer: Layer, path: &Path) -> Result<ProdsearchConfig, ConfigError> {
    layer
        .try_into()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

/// Merge `overlay` into `base` key by key; nested tables merge recursively.
fn merge_layers(base: &mut Layer, overlay: Layer) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_layers(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &ProdsearchConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexBackendType;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_config(content: &str, dir: &Path) -> PathBuf {
        let config_dir = dir.join(LOCAL_CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.index.url, "http://localhost:9200");
        assert_eq!(config.index.index_name, "all_products");
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_test_config(
            r#"
            [index]
            url = "http://custom:9200"
            index_name = "fashion"

            [search]
            default_limit = 5
            "#,
            temp.path(),
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.index.url, "http://custom:9200");
        assert_eq!(config.index.index_name, "fashion");
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.search.default_candidates, 20);
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join(CONFIG_FILE_NAME),
            r#"
            [logging]
            level = "debug"

            [index]
            url = "http://global:9200"
            api_key_env = "GLOBAL_KEY"
            "#,
        )
        .unwrap();

        create_test_config(
            r#"
            [index]
            url = "http://local:9200"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.index.url, "http://local:9200");
        assert_eq!(config.index.api_key_env, Some("GLOBAL_KEY".to_string()));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_local_can_restore_default_value() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join(CONFIG_FILE_NAME),
            r#"
            [search]
            default_limit = 5

            [index]
            backend = "qdrant"
            "#,
        )
        .unwrap();

        create_test_config(
            r#"
            [search]
            default_limit = 10

            [index]
            backend = "elasticsearch"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.index.backend, IndexBackendType::Elasticsearch);
    }

    #[test]
    fn test_nested_sections_merge_per_key() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join(CONFIG_FILE_NAME),
            r#"
            [embedding.openai]
            url = "https://embeddings.internal/v1"
            api_key_env = "EMBEDDINGS_KEY"
            "#,
        )
        .unwrap();

        create_test_config(
            r#"
            [embedding.openai]
            timeout_secs = 5
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();
        let openai = config.embedding.openai.unwrap();

        assert_eq!(openai.url, "https://embeddings.internal/v1");
        assert_eq!(openai.api_key_env.as_deref(), Some("EMBEDDINGS_KEY"));
        assert_eq!(openai.timeout_secs, 5);
        assert_eq!(openai.model, crate::CATALOG_EMBEDDING_MODEL);
    }

    #[test]
    fn test_bad_value_type_names_its_file() {
        let temp = TempDir::new().unwrap();
        create_test_config(
            r#"
            [search]
            default_limit = "ten"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();

        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains(".prodsearch"));
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();

        create_test_config(
            r#"
            [index]
            url = "http://local:9200"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let overrides = ConfigOverrides {
            index_url: Some("http://cli:6334".to_string()),
            index_backend: Some(IndexBackendType::Qdrant),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.index.url, "http://cli:6334");
        assert_eq!(config.index.backend, IndexBackendType::Qdrant);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
            [search]
            query_timeout_secs = 3
            "#,
        )
        .unwrap();

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let config = loader.load_file(&path, None).unwrap();

        assert_eq!(config.search.query_timeout_secs, 3);
        assert_eq!(config.search.embed_timeout_secs, 30);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = create_test_config("[index\nurl = ", temp.path());

        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load_file(&path, None).unwrap_err();

        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = ProdsearchConfig::default();
        config.index.url = "http://saved:9200".to_string();
        config.logging.level = "warn".to_string();

        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded.index.url, "http://saved:9200");
        assert_eq!(loaded.logging.level, "warn");
    }

    #[test]
    fn test_init_local_creates_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init_local(temp.path()).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with(".prodsearch/config.toml"));

        let content = std::fs::read_to_string(&config_path).unwrap();
        let _: ProdsearchConfig = toml::from_str(&content).unwrap();
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join(CONFIG_FILE_NAME),
            r#"
            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let mut loader = ConfigLoader::with_global_dir(&global_dir);

        let _ = loader.load_global().unwrap();
        assert!(loader.global_layer.is_some());

        loader.clear_cache();
        assert!(loader.global_layer.is_none());
    }
}
