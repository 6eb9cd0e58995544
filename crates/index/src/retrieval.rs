//! Book-scoped retrieval over an [`IndexState`].
//!
//! The search result's row index is the only key used to find a chunk:
//! row -> row map -> chunk id -> chunk store. Candidate rows are computed the
//! same way in reverse, so results can never drift onto another book's chunks.

use crate::state::IndexState;
use crate::types::{Chunk, RetrievedChunk};
use bookchat_core::AppResult;

/// Nearest chunks to `query`, restricted to `book_ids` when given.
pub fn retrieve(
    state: &IndexState,
    query: &[f32],
    book_ids: Option<&[String]>,
    top_k: usize,
) -> AppResult<Vec<Chunk>> {
    Ok(retrieve_scored(state, query, book_ids, top_k)?
        .into_iter()
        .map(|hit| hit.chunk)
        .collect())
}

/// Like [`retrieve`], keeping each chunk's row and distance.
///
/// Rows whose chunk record cannot be found are logged and skipped.
pub fn retrieve_scored(
    state: &IndexState,
    query: &[f32],
    book_ids: Option<&[String]>,
    top_k: usize,
) -> AppResult<Vec<RetrievedChunk>> {
    let chunks = state.chunks();
    let chunk_ids = chunks.chunk_ids_for_books(book_ids);
    // Rows without a record would only take top-k slots from live chunks.
    let candidates = state
        .row_map()
        .rows_for(chunk_ids.iter().filter(|id| chunks.contains(id)));

    if candidates.is_empty() {
        tracing::debug!(
            "No indexed chunks for books {:?}",
            book_ids.unwrap_or_default()
        );
    }

    // An empty candidate set searches nothing, but a bad query still errors.
    let hits = state.vectors().search(query, Some(&candidates), top_k)?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(chunk_id) = state.row_map().chunk_id(hit.row) else {
            tracing::warn!("Search returned row {} with no row map entry", hit.row);
            continue;
        };

        match chunks.get(chunk_id) {
            Ok(chunk) => results.push(RetrievedChunk {
                chunk: chunk.clone(),
                row: hit.row,
                distance: hit.distance,
            }),
            Err(e) => tracing::warn!("Skipping row {}: {}", hit.row, e),
        }
    }

    tracing::debug!(
        "Retrieved {} of {} requested chunks from {} candidates",
        results.len(),
        top_k,
        candidates.len()
    );
    Ok(results)
}
