//! Flat embedding matrix with exact squared-L2 nearest-neighbor search.
//!
//! Rows are appended and never reordered or reused, so a row index stays a
//! valid key for the row map for the lifetime of the index.

use crate::types::SearchHit;
use bookchat_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::ops::Range;

/// Row-major `f32` matrix of fixed width.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// Heap entry ordered by (distance, row); the heap top is the worst kept hit.
#[derive(Debug, Clone, Copy)]
struct Ranked(SearchHit);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .distance
            .total_cmp(&other.0.distance)
            .then(self.0.row.cmp(&other.0.row))
    }
}

impl FlatIndex {
    /// Create an empty index. Fails if `dimension` is zero.
    pub fn new(dimension: usize) -> AppResult<Self> {
        if dimension == 0 {
            return Err(AppError::Validation(
                "Index dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Rebuild from a flat buffer whose length is a multiple of `dimension`.
    pub(crate) fn from_raw(dimension: usize, data: Vec<f32>) -> AppResult<Self> {
        let mut index = Self::new(dimension)?;
        if data.len() % dimension != 0 {
            return Err(AppError::CorruptState(format!(
                "Vector buffer of {} floats is not a multiple of dimension {}",
                data.len(),
                dimension
            )));
        }
        index.data = data;
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole matrix, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One stored row.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// Check that every vector has exactly `dimension` components.
    pub fn check_dimensions(&self, vectors: &[Vec<f32>]) -> AppResult<()> {
        for vector in vectors {
            let actual = vector.len();
            if actual != self.dimension {
                return Err(AppError::Dimension {
                    expected: self.dimension,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Append vectors and return the row indices they were assigned.
    ///
    /// All vectors are checked before any is appended.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> AppResult<Range<usize>> {
        self.check_dimensions(vectors)?;

        let start = self.len();
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        Ok(start..self.len())
    }

    /// The `k` rows closest to `query`, nearest first.
    ///
    /// With `candidate_rows`, only those rows are scored; rows past the end
    /// of the index are ignored. Equal distances rank the lower row first.
    pub fn search(
        &self,
        query: &[f32],
        candidate_rows: Option<&HashSet<usize>>,
        k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(AppError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k.min(self.len()) + 1);
        let mut offer = |row: usize| {
            let Some(vector) = self.vector(row) else {
                return;
            };
            let hit = Ranked(SearchHit {
                row,
                distance: squared_l2(query, vector),
            });
            if heap.len() < k {
                heap.push(hit);
            } else if heap.peek().is_some_and(|worst| hit < *worst) {
                heap.pop();
                heap.push(hit);
            }
        };

        match candidate_rows {
            Some(rows) => rows.iter().copied().for_each(&mut offer),
            None => (0..self.len()).for_each(&mut offer),
        }

        Ok(heap.into_sorted_vec().into_iter().map(|r| r.0).collect())
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
