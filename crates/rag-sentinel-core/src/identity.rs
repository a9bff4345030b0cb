//! Stable query identity.
//!
//! A query id correlates one logical question across every pipeline stage
//! and across time, so the dedup baseline for `(user, query)` can be found
//! again on a later request or after a restart. The id is the SHA-256 of
//! the cleaned query and the user name, separated by an ASCII unit
//! separator (`0x1F`) so that `("ab", "c")` and `("a", "bc")` never collide.

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Derive the query id for a cleaned query asked by `user`.
///
/// ```rust
/// use rag_sentinel_core::identity::query_id;
///
/// let a = query_id("alice", "Tell me about windows");
/// let b = query_id("alice", "Tell me about windows");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn query_id(user: &str, clean_query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clean_query.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(user.as_bytes());
    format!("{:x}", hasher.finalize())
}
