//! Shared handle over the index state.
//!
//! One writer at a time; any number of readers. Readers observe either the
//! state before an ingestion or the state after it, never a half-applied batch.

use crate::chunk_store::ChunkStore;
use crate::embeddings::{embed_in_batches, EmbeddingProvider};
use crate::persistence::{self, IndexPaths};
use crate::retrieval;
use crate::state::IndexState;
use crate::types::{Chunk, ChunkCandidate, IndexStats, IngestReport, RetrievedChunk};
use bookchat_core::{AppError, AppResult};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A book index, optionally backed by files.
#[derive(Debug)]
pub struct BookIndex {
    state: RwLock<IndexState>,
    paths: Option<IndexPaths>,
}

impl BookIndex {
    /// Open the index stored at `paths`, or start an empty one if nothing is there.
    pub fn open(paths: IndexPaths, dimension: usize) -> AppResult<Self> {
        let state = match persistence::load(&paths) {
            Ok(state) => {
                if state.dimension() != dimension {
                    return Err(AppError::Dimension {
                        expected: dimension,
                        actual: state.dimension(),
                    });
                }
                let stats = state.stats();
                tracing::info!(
                    "Opened index at {:?}: {} books, {} chunks, {} vectors",
                    paths.metadata,
                    stats.total_books,
                    stats.total_chunks,
                    stats.total_vectors
                );
                state
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("No index at {:?}, starting empty", paths.metadata);
                IndexState::new(dimension)?
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            state: RwLock::new(state),
            paths: Some(paths),
        })
    }

    /// An index that lives only in memory.
    pub fn in_memory(dimension: usize) -> AppResult<Self> {
        Ok(Self {
            state: RwLock::new(IndexState::new(dimension)?),
            paths: None,
        })
    }

    pub fn paths(&self) -> Option<&IndexPaths> {
        self.paths.as_ref()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| AppError::Other("Index lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| AppError::Other("Index lock poisoned".to_string()))
    }

    pub fn dimension(&self) -> AppResult<usize> {
        Ok(self.read()?.dimension())
    }

    /// Add or replace a book whose embeddings are already computed.
    ///
    /// The state is saved before the write lock is released. If that save
    /// fails the error is returned, but the batch stays in memory and goes
    /// out with the next successful save.
    pub fn ingest_embedded(
        &self,
        book_id: &str,
        candidates: &[ChunkCandidate],
        embeddings: &[Vec<f32>],
    ) -> AppResult<IngestReport> {
        let mut state = self.write()?;
        let outcome = state.append_book(book_id, candidates, embeddings)?;

        tracing::info!(
            "Ingested book '{}': {} chunks at rows {}..{}, {} replaced",
            book_id,
            outcome.chunk_ids.len(),
            outcome.rows.start,
            outcome.rows.end,
            outcome.replaced
        );

        let persisted = match &self.paths {
            Some(paths) => {
                persistence::save(&state, paths)?;
                true
            }
            None => false,
        };

        Ok(IngestReport {
            book_id: book_id.to_string(),
            chunk_ids: outcome.chunk_ids,
            first_row: outcome.rows.start,
            replaced_chunks: outcome.replaced,
            persisted,
        })
    }

    /// Embed a book's chunks with `provider`, `batch_size` texts per call,
    /// and ingest them.
    ///
    /// The batch is validated before the provider is called. Embedding
    /// happens before any lock is taken; if it fails nothing changes.
    pub async fn ingest_book(
        &self,
        book_id: &str,
        candidates: &[ChunkCandidate],
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> AppResult<IngestReport> {
        ChunkStore::validate_batch(book_id, candidates)?;

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_in_batches(provider, &texts, batch_size).await?;

        self.ingest_embedded(book_id, candidates, &embeddings)
    }

    pub fn retrieve(
        &self,
        query: &[f32],
        book_ids: Option<&[String]>,
        top_k: usize,
    ) -> AppResult<Vec<Chunk>> {
        let state = self.read()?;
        retrieval::retrieve(&state, query, book_ids, top_k)
    }

    pub fn retrieve_scored(
        &self,
        query: &[f32],
        book_ids: Option<&[String]>,
        top_k: usize,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let state = self.read()?;
        retrieval::retrieve_scored(&state, query, book_ids, top_k)
    }

    /// Embed `query_text` and return the nearest chunks with their distances.
    pub async fn retrieve_text(
        &self,
        query_text: &str,
        provider: &dyn EmbeddingProvider,
        book_ids: Option<&[String]>,
        top_k: usize,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let query = provider.embed(query_text).await?;
        self.retrieve_scored(&query, book_ids, top_k)
    }

    pub fn stats(&self) -> AppResult<IndexStats> {
        Ok(self.read()?.stats())
    }

    /// Write the current state to the index's own files.
    pub fn save(&self) -> AppResult<()> {
        let paths = self
            .paths
            .as_ref()
            .ok_or_else(|| AppError::Config("Index has no storage path".to_string()))?;
        self.save_to(paths)
    }

    /// Write the current state to `paths`.
    pub fn save_to(&self, paths: &IndexPaths) -> AppResult<()> {
        let state = self.read()?;
        persistence::save(&state, paths)?;
        tracing::debug!("Saved index to {:?}", paths.metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;

    /// Fails every call.
    #[derive(Debug)]
    struct FailingProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn provider_name(&self) -> &str {
            "failing"
        }

        fn model_name(&self) -> &str {
            "failing-v1"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Err(AppError::Embedding("service unavailable".to_string()))
        }
    }

    /// Records the size of every batch it is asked to embed.
    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn provider_name(&self) -> &str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting-v1"
        }

        fn dimensions(&self) -> usize {
            1
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn batch(texts: &[&str]) -> Vec<ChunkCandidate> {
        texts.iter().map(|t| ChunkCandidate::new(*t, None)).collect()
    }

    #[test]
    fn test_in_memory_ingest_is_not_persisted() {
        let index = BookIndex::in_memory(2).unwrap();
        let report = index
            .ingest_embedded("a", &batch(&["x", "y"]), &[vec![0.0, 0.0], vec![1.0, 1.0]])
            .unwrap();

        assert!(!report.persisted);
        assert_eq!(report.chunk_ids, vec!["a_chunk_0", "a_chunk_1"]);
        assert_eq!(report.first_row, 0);
        assert!(matches!(index.save(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_open_missing_starts_empty() {
        let temp = TempDir::new().unwrap();
        let index = BookIndex::open(IndexPaths::from_base(&temp.path().join("idx")), 3).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.dimension, 3);
        assert_eq!(stats.total_vectors, 0);
    }

    #[test]
    fn test_ingest_persists_and_reopens() {
        let temp = TempDir::new().unwrap();
        let paths = IndexPaths::from_base(&temp.path().join("idx"));

        let index = BookIndex::open(paths.clone(), 2).unwrap();
        let report = index
            .ingest_embedded("a", &batch(&["x"]), &[vec![1.0, 2.0]])
            .unwrap();
        assert!(report.persisted);
        assert!(paths.exists());

        let reopened = BookIndex::open(paths, 2).unwrap();
        let hits = reopened.retrieve(&[1.0, 2.0], None, 1).unwrap();
        assert_eq!(hits[0].chunk_id, "a_chunk_0");
    }

    #[test]
    fn test_open_rejects_dimension_change() {
        let temp = TempDir::new().unwrap();
        let paths = IndexPaths::from_base(&temp.path().join("idx"));
        BookIndex::open(paths.clone(), 2)
            .unwrap()
            .ingest_embedded("a", &batch(&["x"]), &[vec![1.0, 2.0]])
            .unwrap();

        let err = BookIndex::open(paths, 4).unwrap_err();
        assert!(matches!(err, AppError::Dimension { expected: 4, actual: 2 }));
    }

    #[test]
    fn test_save_to_alternate_path() {
        let temp = TempDir::new().unwrap();
        let index = BookIndex::in_memory(2).unwrap();
        index
            .ingest_embedded("a", &batch(&["x"]), &[vec![1.0, 2.0]])
            .unwrap();

        let copy = IndexPaths::from_base(&temp.path().join("copy"));
        index.save_to(&copy).unwrap();
        assert_eq!(BookIndex::open(copy, 2).unwrap().stats().unwrap().total_chunks, 1);
    }

    #[tokio::test]
    async fn test_failing_provider_leaves_index_untouched() {
        let index = BookIndex::in_memory(2).unwrap();
        index
            .ingest_embedded("a", &batch(&["x"]), &[vec![1.0, 2.0]])
            .unwrap();
        let before = index.stats().unwrap();

        let err = index
            .ingest_book("a", &batch(&["y", "z"]), &FailingProvider, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Embedding(_)));
        assert_eq!(index.stats().unwrap(), before);
        assert_eq!(index.retrieve(&[1.0, 2.0], None, 5).unwrap()[0].chunk_id, "a_chunk_0");
    }

    #[tokio::test]
    async fn test_ingest_book_and_retrieve_text() {
        let provider = crate::embeddings::TrigramProvider::new(64).unwrap();
        let index = BookIndex::in_memory(64).unwrap();
        index
            .ingest_book(
                "moby",
                &batch(&["Call me Ishmael.", "The whale breached beside the ship."]),
                &provider,
                100,
            )
            .await
            .unwrap();

        let hits = index
            .retrieve_text("whale ship", &provider, None, 1)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.chunk_id, "moby_chunk_1");
    }

    #[tokio::test]
    async fn test_ingest_book_uses_given_batch_size() {
        let provider = CountingProvider::default();
        let index = BookIndex::in_memory(1).unwrap();

        let report = index
            .ingest_book("a", &batch(&["one", "two", "three", "four", "five"]), &provider, 2)
            .await
            .unwrap();

        assert_eq!(report.chunk_ids.len(), 5);
        assert_eq!(*provider.calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_before_embedding() {
        let provider = CountingProvider::default();
        let index = BookIndex::in_memory(1).unwrap();

        let err = index
            .ingest_book("a", &batch(&["fine", "   "]), &provider, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(provider.calls.lock().unwrap().is_empty());
        assert_eq!(index.stats().unwrap().total_vectors, 0);
    }

    #[test]
    fn test_concurrent_readers_see_whole_batches() {
        let index = Arc::new(BookIndex::in_memory(1).unwrap());

        let writer = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..20 {
                    let book = format!("book{}", i);
                    index
                        .ingest_embedded(
                            &book,
                            &batch(&["one", "two", "three"]),
                            &[vec![i as f32], vec![i as f32], vec![i as f32]],
                        )
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let stats = index.stats().unwrap();
                        assert_eq!(stats.total_vectors % 3, 0);
                        assert_eq!(stats.total_chunks, stats.total_vectors);
                        let hits = index.retrieve(&[0.0], None, 100).unwrap();
                        assert_eq!(hits.len() % 3, 0);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(index.stats().unwrap().total_vectors, 60);
    }
}
