//! Context retrieval: a keyed lookup of a query's embedding against the
//! shared [`VectorIndex`].
//!
//! The returned [`RetrievedContext`] carries the originating query's id, so
//! each query yields exactly one context row regardless of how many
//! documents matched.

use std::sync::Arc;

use rag_sentinel_core::index::VectorIndex;
use rag_sentinel_core::models::{Query, RetrievedContext};
use tracing::debug;

use crate::error::SentinelResult;

/// Payload stored per indexed document: the document text.
pub type DocumentIndex = VectorIndex<String>;

pub struct Retriever {
    index: Arc<DocumentIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<DocumentIndex>, k: usize) -> Self {
        Self { index, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Fetch the `k` nearest documents for `query`.
    ///
    /// A dimensionality mismatch between the query embedding and the index
    /// is reported as a configuration error.
    pub fn retrieve(&self, query: &Query) -> SentinelResult<RetrievedContext> {
        let documents = self.index.query(&query.embedding, self.k)?;
        debug!(
            query_id = %query.query_id,
            documents = documents.len(),
            indexed = self.index.len(),
            "retrieved context"
        );
        Ok(RetrievedContext {
            query_id: query.query_id.clone(),
            documents,
        })
    }
}
