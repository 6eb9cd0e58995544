//! Book vector index and retrieval.
//!
//! Chunks of ingested books are embedded into an append-only flat L2 index.
//! A row map ties every vector row to its chunk id, and a chunk store keeps
//! the records grouped per book, so searches can be scoped to a set of books
//! and always resolve rows to the right text. The whole state is persisted
//! atomically after each ingestion.

pub mod book_index;
pub mod chunk_store;
pub mod config;
pub mod embeddings;
pub mod persistence;
pub mod retrieval;
pub mod row_map;
pub mod state;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use book_index::BookIndex;
pub use config::IndexConfig;
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use persistence::IndexPaths;
pub use state::IndexState;
pub use types::{Chunk, ChunkCandidate, IndexStats, IngestReport, RetrievedChunk, SearchHit};
