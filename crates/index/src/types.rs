//! Index type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored span of book text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique identifier, `{book_id}_chunk_{sequence}`
    pub chunk_id: String,

    /// Book this chunk belongs to
    pub book_id: String,

    /// Text content
    pub text: String,

    /// Page number in the source document, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A chunk as handed over by the document chunker, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCandidate {
    pub text: String,

    #[serde(default)]
    pub page: Option<u32>,
}

impl ChunkCandidate {
    pub fn new(text: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            page,
        }
    }
}

/// One nearest-neighbor hit: a row of the vector index and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub distance: f32,
}

/// A retrieved chunk together with where and how close it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,

    /// Row index in the vector index
    pub row: usize,

    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Outcome of ingesting one book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub book_id: String,

    /// Ids assigned to the new chunks, in input order
    pub chunk_ids: Vec<String>,

    /// First row index assigned to the batch
    pub first_row: usize,

    /// Chunks of an earlier ingestion of this book that were retired
    pub replaced_chunks: usize,

    /// Whether the post-ingestion state reached disk
    pub persisted: bool,
}

/// Statistics for an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Embedding dimension
    pub dimension: usize,

    /// Books with at least one live chunk
    pub total_books: usize,

    /// Live chunk records
    pub total_chunks: usize,

    /// Rows in the vector index, including dangling ones
    pub total_vectors: usize,

    /// Rows whose chunk was retired by re-ingestion
    pub dangling_rows: usize,

    /// Time of the most recent ingestion
    pub last_ingested_at: Option<DateTime<Utc>>,
}
