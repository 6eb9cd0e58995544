//! Scoped search, ranking and re-ingestion.

use super::{books, candidates};
use crate::book_index::BookIndex;
use bookchat_core::AppError;

#[cfg(test)]
mod tests {
    use super::*;

    fn two_books() -> BookIndex {
        let index = BookIndex::in_memory(2).unwrap();
        index
            .ingest_embedded(
                "A",
                &candidates(&["a one", "a two", "a three"]),
                &[vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]],
            )
            .unwrap();
        index
            .ingest_embedded(
                "B",
                &candidates(&["b one", "b two"]),
                &[vec![0.0, 0.1], vec![1.0, 0.1]],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_rows_follow_ingestion_order() {
        let index = two_books();
        let hits = index.retrieve_scored(&[0.0, 0.1], None, 5).unwrap();
        let rows: Vec<(usize, &str)> = hits
            .iter()
            .map(|h| (h.row, h.chunk.chunk_id.as_str()))
            .collect();

        assert!(rows.contains(&(0, "A_chunk_0")));
        assert!(rows.contains(&(2, "A_chunk_2")));
        assert!(rows.contains(&(3, "B_chunk_0")));
        assert!(rows.contains(&(4, "B_chunk_1")));
    }

    #[test]
    fn test_scoped_search_never_crosses_books() {
        let index = two_books();

        let scope_a = books(&["A"]);
        let a_hits = index.retrieve(&[0.0, 0.1], Some(scope_a.as_slice()), 10).unwrap();
        assert_eq!(a_hits.len(), 3);
        assert!(a_hits.iter().all(|c| c.book_id == "A"));
        assert_eq!(a_hits[0].text, "a one");

        let scope_b = books(&["B"]);
        let b_hits = index.retrieve(&[0.0, 0.0], Some(scope_b.as_slice()), 10).unwrap();
        assert_eq!(b_hits.len(), 2);
        assert!(b_hits.iter().all(|c| c.book_id == "B"));
        assert_eq!(b_hits[0].text, "b one");
        assert_eq!(b_hits[0].page, Some(1));
    }

    #[test]
    fn test_multi_book_scope() {
        let index = two_books();
        let scope = books(&["B", "A"]);
        let hits = index.retrieve(&[1.0, 0.0], Some(scope.as_slice()), 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["A_chunk_1", "B_chunk_1"]);
    }

    #[test]
    fn test_ranking_is_deterministic_with_row_tie_break() {
        let index = BookIndex::in_memory(3).unwrap();
        index
            .ingest_embedded(
                "A",
                &candidates(&["x", "y", "z"]),
                &[
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.0, 0.0, 1.0],
                ],
            )
            .unwrap();

        for _ in 0..3 {
            let hits = index.retrieve_scored(&[1.0, 0.1, 0.1], None, 2).unwrap();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].row, 0);
            assert!((hits[0].distance - 0.02).abs() < 1e-5);
            assert_eq!(hits[1].row, 1);
            assert!((hits[1].distance - 1.82).abs() < 1e-5);
        }

        let all = index.retrieve_scored(&[1.0, 0.1, 0.1], None, 3).unwrap();
        assert_eq!(all[1].distance, all[2].distance);
        assert_eq!(all[2].row, 2);
    }

    #[test]
    fn test_query_for_absent_book_is_empty() {
        let index = BookIndex::in_memory(2).unwrap();
        index
            .ingest_embedded("A", &candidates(&["only"]), &[vec![0.0, 0.0]])
            .unwrap();

        let scope = books(&["B"]);
        let hits = index.retrieve(&[0.0, 0.0], Some(scope.as_slice()), 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_top_k_larger_than_index() {
        let index = two_books();
        assert_eq!(index.retrieve(&[0.0, 0.0], None, 100).unwrap().len(), 5);
        assert!(index.retrieve(&[0.0, 0.0], None, 0).unwrap().is_empty());
    }

    #[test]
    fn test_reingestion_replaces_partition() {
        let index = BookIndex::in_memory(1).unwrap();
        index
            .ingest_embedded(
                "A",
                &candidates(&["old 0", "old 1", "old 2"]),
                &[vec![0.0], vec![1.0], vec![2.0]],
            )
            .unwrap();
        let report = index
            .ingest_embedded("A", &candidates(&["new 0", "new 1"]), &[vec![0.5], vec![10.0]])
            .unwrap();

        assert_eq!(report.chunk_ids, vec!["A_chunk_3", "A_chunk_4"]);
        assert_eq!(report.first_row, 3);
        assert_eq!(report.replaced_chunks, 3);

        // Old rows sit closest to the query but are no longer reachable.
        let hits = index.retrieve(&[0.0], None, 10).unwrap();
        let texts: Vec<&str> = hits.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["new 0", "new 1"]);

        let scope = books(&["A"]);
        assert_eq!(index.retrieve(&[0.0], Some(scope.as_slice()), 10).unwrap(), hits);

        let stats = index.stats().unwrap();
        assert_eq!(stats.total_vectors, 5);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.dangling_rows, 3);
        assert_eq!(stats.total_books, 1);
    }

    #[test]
    fn test_failed_ingestion_leaves_state_untouched() {
        let index = two_books();
        let before = index.stats().unwrap();

        let err = index
            .ingest_embedded("C", &candidates(&["c"]), &[vec![1.0, 2.0, 3.0]])
            .unwrap_err();
        assert!(matches!(err, AppError::Dimension { expected: 2, actual: 3 }));

        let err = index
            .ingest_embedded("C", &candidates(&["c", "  "]), &[vec![0.0, 0.0], vec![0.0, 0.0]])
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = index.ingest_embedded("C", &[], &[]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = index.retrieve(&[0.0], None, 3).unwrap_err();
        assert!(matches!(err, AppError::Dimension { .. }));

        assert_eq!(index.stats().unwrap(), before);
    }
}
