//! Append-only in-memory vector index.
//!
//! Entries are kept in insertion order in a `Vec` behind `std::sync::RwLock`.
//! An insertion takes the write lock for a single `push`, so readers either
//! see a document completely or not at all. Queries hold the read lock for
//! the duration of a brute-force scan and therefore observe one consistent
//! snapshot of the index.
//!
//! Nearest-neighbor ranking is exact: every entry is scored with the
//! configured [`Metric`], the `k` best are selected in `O(n)` and then
//! sorted. Ties are broken by insertion order, earliest first.

use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::embedding::Metric;

/// Errors returned by [`VectorIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// An embedding did not have the index's fixed dimensionality.
    ///
    /// This is a configuration error (wrong model, wrong `dims`), never a
    /// per-record problem, and callers should treat it as fatal.
    #[error("embedding dimensionality mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

struct IndexEntry<P> {
    id: String,
    embedding: Vec<f32>,
    payload: P,
}

/// A ranked query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<P> {
    pub id: String,
    pub distance: f32,
    pub payload: P,
}

/// Append-only store of `(id, embedding, payload)` triples.
pub struct VectorIndex<P> {
    dims: usize,
    metric: Metric,
    entries: RwLock<Vec<IndexEntry<P>>>,
}

impl<P: Clone> VectorIndex<P> {
    pub fn new(dims: usize, metric: Metric) -> Self {
        Self {
            dims,
            metric,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a document. Existing entries are never touched.
    ///
    /// Returns the insertion sequence number of the new entry.
    pub fn insert(
        &self,
        id: impl Into<String>,
        embedding: Vec<f32>,
        payload: P,
    ) -> Result<usize, IndexError> {
        self.check_dims(&embedding)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(IndexEntry {
            id: id.into(),
            embedding,
            payload,
        });
        Ok(entries.len() - 1)
    }

    /// Payloads of the `k` entries closest to `target`, ascending by distance.
    pub fn query(&self, target: &[f32], k: usize) -> Result<Vec<P>, IndexError> {
        Ok(self
            .query_neighbors(target, k)?
            .into_iter()
            .map(|n| n.payload)
            .collect())
    }

    /// Like [`query`](Self::query) but also returns ids and distances.
    pub fn query_neighbors(&self, target: &[f32], k: usize) -> Result<Vec<Neighbor<P>>, IndexError> {
        self.check_dims(target)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        // (distance, insertion sequence)
        let mut scored: Vec<(f32, usize)> = entries
            .iter()
            .enumerate()
            .map(|(seq, e)| (self.metric.distance(target, &e.embedding), seq))
            .collect();

        let by_rank = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
        };

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(distance, seq)| {
                let e = &entries[seq];
                Neighbor {
                    id: e.id.clone(),
                    distance,
                    payload: e.payload.clone(),
                }
            })
            .collect())
    }

    fn check_dims(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: v.len(),
            });
        }
        Ok(())
    }
}
