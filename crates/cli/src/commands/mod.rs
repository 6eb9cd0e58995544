//! Command handlers for the bookchat CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ingest;
pub mod retrieve;
pub mod stats;

// Re-export command types for convenience
pub use ingest::IngestCommand;
pub use retrieve::RetrieveCommand;
pub use stats::StatsCommand;

use bookchat_core::{config::AppConfig, AppResult};
use bookchat_index::{config as index_config, BookIndex, IndexConfig};

/// Load the workspace's index configuration and open its index.
pub(crate) fn open_index(config: &AppConfig) -> AppResult<(IndexConfig, BookIndex)> {
    let index_config = index_config::load_config(&config.workspace)?;
    let paths = index_config.paths(&config.workspace);
    tracing::debug!("Index files: {:?}, {:?}", paths.vectors, paths.metadata);

    let index = BookIndex::open(paths, index_config.dimension)?;
    Ok((index_config, index))
}
