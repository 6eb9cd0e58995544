//! Application configuration for bookchat.
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.bookchat/config.yaml` or `BOOKCHAT_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)
//!
//! Index-specific settings (storage path, dimension, embedding provider) live
//! in the index crate's own config file next to this one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".bookchat";

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the workspace root (contains .bookchat/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log filter override
    pub log_level: Option<String>,

    /// Log line format
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// On-disk layout of `.bookchat/config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            log_format: LogFormat::Text,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `BOOKCHAT_WORKSPACE`: Override workspace path
    /// - `BOOKCHAT_CONFIG`: Path to config file
    /// - `BOOKCHAT_LOG_FORMAT`: `text` or `json`
    /// - `RUST_LOG`: Log filter
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with the workspace and config file chosen by
    /// the caller (e.g. command-line flags) taking precedence over the
    /// environment. Both are resolved before the config file is read.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("BOOKCHAT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("BOOKCHAT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            config.config_file = Some(config_file);
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(format) = std::env::var("BOOKCHAT_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format)?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML config file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = LogFormat::parse(&format)?;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides; flags win over file and environment.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Path to the `.bookchat` state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Create the `.bookchat` directory if missing.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }
}
