//! Chunk records and the book -> chunk partitioning.
//!
//! Partitions scope searches to a set of books. They never address the
//! vector index directly; that goes through the row map.

use crate::types::{Chunk, ChunkCandidate};
use bookchat_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The chunks currently belonging to one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPartition {
    /// Live chunk ids, in ingestion order
    pub chunk_ids: Vec<String>,

    /// Sequence number the next assigned chunk id will use
    pub next_sequence: u64,

    /// When the current chunks were ingested
    pub ingested_at: DateTime<Utc>,
}

/// Owns chunk records and the per-book partitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStore {
    records: HashMap<String, Chunk>,
    partitions: HashMap<String, BookPartition>,
    /// Books ordered by their most recent ingestion
    book_order: Vec<String>,
}

/// Build the id for the `sequence`-th chunk ever assigned to a book.
pub fn chunk_id_for(book_id: &str, sequence: u64) -> String {
    format!("{}_chunk_{}", book_id, sequence)
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check an ingestion batch without touching the store.
    pub fn validate_batch(book_id: &str, chunks: &[ChunkCandidate]) -> AppResult<()> {
        if book_id.trim().is_empty() {
            return Err(AppError::Validation("book_id must not be empty".to_string()));
        }

        if chunks.is_empty() {
            return Err(AppError::Validation(format!(
                "No chunks supplied for book '{}'",
                book_id
            )));
        }

        if let Some(position) = chunks.iter().position(|c| c.text.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Chunk {} of book '{}' has no text",
                position, book_id
            )));
        }

        Ok(())
    }

    /// Store a book's chunks, replacing whatever the book had before.
    ///
    /// Returns the assigned chunk ids in input order. Records from an earlier
    /// ingestion of the same book are removed.
    pub fn put_chunks(&mut self, book_id: &str, chunks: &[ChunkCandidate]) -> AppResult<Vec<String>> {
        Self::validate_batch(book_id, chunks)?;

        let next_sequence = self.next_sequence(book_id) + chunks.len() as u64;
        let chunk_ids = self.next_chunk_ids(book_id, chunks.len());

        if let Some(previous) = self.partitions.remove(book_id) {
            for chunk_id in &previous.chunk_ids {
                self.records.remove(chunk_id);
            }
            self.book_order.retain(|b| b != book_id);
        }

        for (chunk_id, candidate) in chunk_ids.iter().zip(chunks) {
            self.records.insert(
                chunk_id.clone(),
                Chunk {
                    chunk_id: chunk_id.clone(),
                    book_id: book_id.to_string(),
                    text: candidate.text.clone(),
                    page: candidate.page,
                },
            );
        }

        self.partitions.insert(
            book_id.to_string(),
            BookPartition {
                chunk_ids: chunk_ids.clone(),
                next_sequence,
                ingested_at: Utc::now(),
            },
        );
        self.book_order.push(book_id.to_string());

        Ok(chunk_ids)
    }

    /// Sequence number the book's next chunk id will use.
    pub fn next_sequence(&self, book_id: &str) -> u64 {
        self.partitions
            .get(book_id)
            .map_or(0, |partition| partition.next_sequence)
    }

    /// Ids that `put_chunks` would assign to a batch of `count` chunks.
    pub fn next_chunk_ids(&self, book_id: &str, count: usize) -> Vec<String> {
        let start = self.next_sequence(book_id);
        (start..start + count as u64)
            .map(|sequence| chunk_id_for(book_id, sequence))
            .collect()
    }

    /// Look up a chunk record.
    pub fn get(&self, chunk_id: &str) -> AppResult<&Chunk> {
        self.records
            .get(chunk_id)
            .ok_or_else(|| AppError::NotFound(format!("chunk '{}'", chunk_id)))
    }

    /// All live records, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &Chunk> {
        self.records.values()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.records.contains_key(chunk_id)
    }

    /// Chunk ids belonging to the given books.
    ///
    /// `None` or an empty slice selects every book, most recently ingested
    /// last. Otherwise books contribute in the order given, each once;
    /// unknown books contribute nothing.
    pub fn chunk_ids_for_books(&self, book_ids: Option<&[String]>) -> Vec<String> {
        let books: Vec<&str> = match book_ids {
            Some(ids) if !ids.is_empty() => {
                let mut seen = HashSet::new();
                ids.iter()
                    .map(String::as_str)
                    .filter(|id| seen.insert(*id))
                    .collect()
            }
            _ => self.book_order.iter().map(String::as_str).collect(),
        };

        books
            .into_iter()
            .filter_map(|book_id| self.partitions.get(book_id))
            .flat_map(|partition| partition.chunk_ids.iter().cloned())
            .collect()
    }

    pub fn partition(&self, book_id: &str) -> Option<&BookPartition> {
        self.partitions.get(book_id)
    }

    /// Book ids, most recently ingested last.
    pub fn book_ids(&self) -> &[String] {
        &self.book_order
    }

    /// Partitions in book order.
    pub fn partitions(&self) -> impl Iterator<Item = (&str, &BookPartition)> {
        self.book_order
            .iter()
            .filter_map(|id| self.partitions.get(id).map(|p| (id.as_str(), p)))
    }

    /// Number of live chunk records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn book_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn last_ingested_at(&self) -> Option<DateTime<Utc>> {
        self.partitions.values().map(|p| p.ingested_at).max()
    }

    /// Rebuild a store from persisted parts.
    ///
    /// Partition entries without a record are kept; retrieval skips them.
    pub(crate) fn restore(records: Vec<Chunk>, partitions: Vec<(String, BookPartition)>) -> Self {
        let records: HashMap<String, Chunk> = records
            .into_iter()
            .map(|chunk| (chunk.chunk_id.clone(), chunk))
            .collect();

        let mut store = Self {
            records,
            partitions: HashMap::with_capacity(partitions.len()),
            book_order: Vec::with_capacity(partitions.len()),
        };

        for (book_id, partition) in partitions {
            let missing = partition
                .chunk_ids
                .iter()
                .filter(|id| !store.records.contains_key(*id))
                .count();
            if missing > 0 {
                tracing::warn!(
                    "Book '{}' references {} chunk record(s) that are missing",
                    book_id,
                    missing
                );
            }
            store.book_order.push(book_id.clone());
            store.partitions.insert(book_id, partition);
        }

        store
    }

    /// Drop one record while leaving partitions untouched.
    #[cfg(test)]
    pub(crate) fn forget_record(&mut self, chunk_id: &str) -> Option<Chunk> {
        self.records.remove(chunk_id)
    }
}
