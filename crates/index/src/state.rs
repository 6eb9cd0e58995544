//! The index aggregate: vectors, row map and chunk store, kept in step.

use crate::chunk_store::ChunkStore;
use crate::row_map::RowMap;
use crate::types::{ChunkCandidate, IndexStats};
use crate::vector_index::FlatIndex;
use bookchat_core::{AppError, AppResult};
use std::ops::Range;

/// Everything the index persists as one unit.
///
/// Invariants:
/// - `vectors.len() == row_map.len()`
/// - every chunk record has a row
#[derive(Debug, Clone, PartialEq)]
pub struct IndexState {
    vectors: FlatIndex,
    row_map: RowMap,
    chunks: ChunkStore,
}

/// What one book batch changed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub chunk_ids: Vec<String>,
    pub rows: Range<usize>,
    /// Chunks of the book's previous ingestion that were retired
    pub replaced: usize,
}

impl IndexState {
    /// Create an empty state with a fixed embedding dimension.
    pub fn new(dimension: usize) -> AppResult<Self> {
        Ok(Self {
            vectors: FlatIndex::new(dimension)?,
            row_map: RowMap::new(),
            chunks: ChunkStore::new(),
        })
    }

    /// Assemble a state from loaded parts, checking the invariants.
    pub(crate) fn from_parts(
        vectors: FlatIndex,
        row_map: RowMap,
        chunks: ChunkStore,
    ) -> AppResult<Self> {
        if vectors.len() != row_map.len() {
            return Err(AppError::CorruptState(format!(
                "{} vectors but {} row map entries",
                vectors.len(),
                row_map.len()
            )));
        }

        if let Some(orphan) = chunks.records().find(|c| row_map.row(&c.chunk_id).is_none()) {
            return Err(AppError::CorruptState(format!(
                "Chunk '{}' has no vector row",
                orphan.chunk_id
            )));
        }

        Ok(Self {
            vectors,
            row_map,
            chunks,
        })
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn vectors(&self) -> &FlatIndex {
        &self.vectors
    }

    pub fn row_map(&self) -> &RowMap {
        &self.row_map
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// Add or replace one book's chunks and their embeddings.
    ///
    /// Every check runs before the first mutation, so on error the state is
    /// exactly as it was.
    pub fn append_book(
        &mut self,
        book_id: &str,
        candidates: &[ChunkCandidate],
        embeddings: &[Vec<f32>],
    ) -> AppResult<AppendOutcome> {
        ChunkStore::validate_batch(book_id, candidates)?;

        if candidates.len() != embeddings.len() {
            return Err(AppError::Validation(format!(
                "Book '{}' has {} chunks but {} embeddings",
                book_id,
                candidates.len(),
                embeddings.len()
            )));
        }

        self.vectors.check_dimensions(embeddings)?;

        let chunk_ids = self.chunks.next_chunk_ids(book_id, candidates.len());
        self.row_map.check_new(&chunk_ids)?;

        let replaced = self
            .chunks
            .partition(book_id)
            .map_or(0, |p| p.chunk_ids.len());

        let rows = self.vectors.add(embeddings)?;
        self.row_map.extend(&chunk_ids)?;
        let assigned = self.chunks.put_chunks(book_id, candidates)?;
        debug_assert_eq!(assigned, chunk_ids);

        Ok(AppendOutcome {
            chunk_ids: assigned,
            rows,
            replaced,
        })
    }

    /// Rows whose chunk record no longer exists.
    pub fn dangling_rows(&self) -> usize {
        self.row_map
            .chunk_ids()
            .iter()
            .filter(|id| !self.chunks.contains(id))
            .count()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            dimension: self.dimension(),
            total_books: self.chunks.book_count(),
            total_chunks: self.chunks.len(),
            total_vectors: self.vectors.len(),
            dangling_rows: self.dangling_rows(),
            last_ingested_at: self.chunks.last_ingested_at(),
        }
    }

    #[cfg(test)]
    pub(crate) fn chunks_mut(&mut self) -> &mut ChunkStore {
        &mut self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(texts: &[&str]) -> Vec<ChunkCandidate> {
        texts.iter().map(|t| ChunkCandidate::new(*t, None)).collect()
    }

    fn assert_aligned(state: &IndexState) {
        assert_eq!(state.vectors().len(), state.row_map().len());
    }

    #[test]
    fn test_append_assigns_rows_after_existing() {
        let mut state = IndexState::new(2).unwrap();
        let a = state
            .append_book("a", &batch(&["x", "y"]), &[vec![0.0, 0.0], vec![1.0, 1.0]])
            .unwrap();
        let b = state
            .append_book("b", &batch(&["z"]), &[vec![2.0, 2.0]])
            .unwrap();

        assert_eq!(a.rows, 0..2);
        assert_eq!(b.rows, 2..3);
        assert_eq!(state.row_map().chunk_id(2), Some("b_chunk_0"));
        assert_aligned(&state);
    }

    #[test]
    fn test_append_rejects_count_mismatch_without_mutation() {
        let mut state = IndexState::new(2).unwrap();
        let err = state
            .append_book("a", &batch(&["x", "y"]), &[vec![0.0, 0.0]])
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(state.vectors().is_empty());
        assert!(state.chunks().is_empty());
        assert_aligned(&state);
    }

    #[test]
    fn test_append_rejects_bad_dimension_without_mutation() {
        let mut state = IndexState::new(2).unwrap();
        state.append_book("a", &batch(&["x"]), &[vec![0.0, 0.0]]).unwrap();
        let before = state.clone();

        let err = state
            .append_book("a", &batch(&["y", "z"]), &[vec![0.0, 0.0], vec![1.0]])
            .unwrap_err();

        assert!(matches!(err, AppError::Dimension { expected: 2, actual: 1 }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_reingest_leaves_dangling_rows() {
        let mut state = IndexState::new(1).unwrap();
        state
            .append_book("a", &batch(&["1", "2", "3"]), &[vec![1.0], vec![2.0], vec![3.0]])
            .unwrap();
        let outcome = state
            .append_book("a", &batch(&["4"]), &[vec![4.0]])
            .unwrap();

        assert_eq!(outcome.replaced, 3);
        assert_eq!(outcome.rows, 3..4);
        let stats = state.stats();
        assert_eq!(stats.total_vectors, 4);
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.dangling_rows, 3);
        assert_eq!(stats.total_books, 1);
        assert_aligned(&state);
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let vectors = FlatIndex::from_raw(1, vec![1.0, 2.0]).unwrap();
        let row_map = RowMap::from_chunk_ids(vec!["a_chunk_0".to_string()]).unwrap();
        let err = IndexState::from_parts(vectors, row_map, ChunkStore::new()).unwrap_err();
        assert!(matches!(err, AppError::CorruptState(_)));
    }
}
