//! Bidirectional row index <-> chunk id mapping.
//!
//! This is the only path between vector rows and chunk records. A search
//! result's row is resolved here, never by its position in some filtered list.

use bookchat_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMap {
    chunk_ids: Vec<String>,
    rows: HashMap<String, usize>,
}

impl RowMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted row order. Duplicate ids mean corrupt state.
    pub fn from_chunk_ids(chunk_ids: Vec<String>) -> AppResult<Self> {
        let mut rows = HashMap::with_capacity(chunk_ids.len());
        for (row, chunk_id) in chunk_ids.iter().enumerate() {
            if let Some(previous) = rows.insert(chunk_id.clone(), row) {
                return Err(AppError::CorruptState(format!(
                    "Chunk '{}' is mapped to rows {} and {}",
                    chunk_id, previous, row
                )));
            }
        }
        Ok(Self { chunk_ids, rows })
    }

    /// Append ids for rows `len()..len() + ids.len()`.
    ///
    /// Ids already mapped are rejected before anything is appended.
    pub fn extend(&mut self, chunk_ids: &[String]) -> AppResult<()> {
        self.check_new(chunk_ids)?;

        for chunk_id in chunk_ids {
            self.rows.insert(chunk_id.clone(), self.chunk_ids.len());
            self.chunk_ids.push(chunk_id.clone());
        }
        Ok(())
    }

    /// Fail if any id is already mapped or repeats within `chunk_ids`.
    pub fn check_new(&self, chunk_ids: &[String]) -> AppResult<()> {
        let mut batch = HashSet::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            if self.rows.contains_key(chunk_id) || !batch.insert(chunk_id) {
                return Err(AppError::Validation(format!(
                    "Chunk id '{}' already has a row",
                    chunk_id
                )));
            }
        }
        Ok(())
    }

    pub fn chunk_id(&self, row: usize) -> Option<&str> {
        self.chunk_ids.get(row).map(String::as_str)
    }

    pub fn row(&self, chunk_id: &str) -> Option<usize> {
        self.rows.get(chunk_id).copied()
    }

    /// Rows of the given chunk ids; ids without a row are skipped.
    pub fn rows_for<'a, I>(&self, chunk_ids: I) -> HashSet<usize>
    where
        I: IntoIterator<Item = &'a String>,
    {
        chunk_ids
            .into_iter()
            .filter_map(|id| self.row(id))
            .collect()
    }

    /// Chunk ids in row order.
    pub fn chunk_ids(&self) -> &[String] {
        &self.chunk_ids
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }
}
