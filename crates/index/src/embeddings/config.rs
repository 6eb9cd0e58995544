//! Embedding provider configuration.

use serde::{Deserialize, Serialize};

/// Which provider embeds chunk and query text, and how.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum number of texts per provider call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_provider() -> String {
    "trigram".to_string()
}

fn default_model() -> String {
    "trigram-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    100
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}
