//! Index configuration management.

use crate::embeddings::EmbeddingConfig;
use crate::persistence::IndexPaths;
use bookchat_core::config::STATE_DIR;
use bookchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`IndexConfig::index_path`].
pub const INDEX_PATH_ENV: &str = "BOOKCHAT_INDEX_PATH";

/// Settings for the book index of one workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Base path of the persisted index; relative paths resolve against the workspace
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Embedding vector dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Chunks returned by a retrieval when the caller does not say
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/book_index")
}

fn default_dimension() -> usize {
    384
}

fn default_top_k() -> usize {
    5
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            dimension: default_dimension(),
            default_top_k: default_top_k(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Persisted artifact locations for a workspace.
    pub fn paths(&self, workspace: &Path) -> IndexPaths {
        IndexPaths::from_base(&workspace.join(&self.index_path))
    }

    /// Fail if the embedding provider and index disagree on dimension.
    pub fn validate(&self) -> AppResult<()> {
        if self.dimension == 0 {
            return Err(AppError::Config("dimension must be greater than zero".to_string()));
        }
        if self.embedding.dimensions != self.dimension {
            return Err(AppError::Config(format!(
                "Embedding dimensions {} do not match index dimension {}",
                self.embedding.dimensions, self.dimension
            )));
        }
        if self.default_top_k == 0 {
            return Err(AppError::Config("default_top_k must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Path of the index config file for a workspace.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("index.yaml")
}

/// Load the index configuration.
///
/// Reads `.bookchat/index.yaml` if it exists, otherwise uses defaults.
/// `BOOKCHAT_INDEX_PATH` replaces the index path either way.
pub fn load_config(workspace: &Path) -> AppResult<IndexConfig> {
    let mut config = read_config_file(&get_config_path(workspace))?;

    if let Ok(path) = std::env::var(INDEX_PATH_ENV) {
        tracing::debug!("Index path overridden by {}: {}", INDEX_PATH_ENV, path);
        config.index_path = PathBuf::from(path);
    }

    config.validate()?;
    Ok(config)
}

fn read_config_file(config_path: &Path) -> AppResult<IndexConfig> {
    if !config_path.exists() {
        tracing::debug!("No index config at {:?}, using defaults", config_path);
        return Ok(IndexConfig::default());
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Loaded index config from {:?}", config_path);
    Ok(config)
}

/// Save the index configuration to `.bookchat/index.yaml`.
pub fn save_config(workspace: &Path, config: &IndexConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved index config to {:?}", config_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = read_config_file(&get_config_path(temp.path())).unwrap();

        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.dimension, 384);
        assert_eq!(config.default_top_k, 5);
    }

    #[test]
    fn test_save_and_read_config() {
        let temp = TempDir::new().unwrap();
        let mut config = IndexConfig {
            index_path: PathBuf::from("store/idx"),
            dimension: 64,
            default_top_k: 8,
            ..IndexConfig::default()
        };
        config.embedding.dimensions = 64;

        save_config(temp.path(), &config).unwrap();
        let loaded = read_config_file(&get_config_path(temp.path())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let config = IndexConfig::default();
        let paths = config.paths(Path::new("/work"));
        assert_eq!(paths.vectors, PathBuf::from("/work/data/book_index.vectors"));
        assert_eq!(
            paths.metadata,
            PathBuf::from("/work/data/book_index_metadata.json")
        );
    }

    #[test]
    fn test_validate_dimension_mismatch() {
        let mut config = IndexConfig::default();
        config.dimension = 128;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "dimension: [").unwrap();
        assert!(matches!(read_config_file(&path), Err(AppError::Config(_))));
    }
}
