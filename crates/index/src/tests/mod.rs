//! End-to-end scenarios across ingestion, retrieval and persistence.

mod book_scoping;

use crate::types::ChunkCandidate;

fn candidates(texts: &[&str]) -> Vec<ChunkCandidate> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| ChunkCandidate::new(*t, Some(i as u32 + 1)))
        .collect()
}

fn books(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}
