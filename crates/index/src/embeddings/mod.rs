//! Embedding provider seam.
//!
//! The index stores whatever vectors it is given; providers turn chunk and
//! query text into those vectors ahead of any index lock.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, embed_in_batches, EmbeddingProvider};
pub use providers::trigram::TrigramProvider;
