//! Typed errors at the query-pipeline boundary.
//!
//! Adapters and plumbing use `anyhow`; the pipeline wraps their failures in
//! [`SentinelError`] so the HTTP layer can tell a caller mistake from an
//! upstream model failure or a misconfigured deployment.
//!
//! | Variant | Meaning | Surfaces to caller |
//! |---------|---------|--------------------|
//! | `Configuration` | Fatal deployment problem (dimensionality, missing destination) | yes, 500 |
//! | `ExternalCall` | A model call in the answering path failed | yes, 502 |
//! | `Timeout` | The request exceeded its deadline | yes, 504 |
//! | `BadRequest` | The caller sent an unusable query | yes, 400 |
//! | `Delivery` | Alert delivery failed | never, logged only |

use std::fmt;

use rag_sentinel_core::index::IndexError;
use thiserror::Error;

pub type SentinelResult<T> = Result<T, SentinelError>;

/// The external call a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intent,
    Embedding,
    Completion,
    Oracle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Intent => "intent",
            Stage::Embedding => "embedding",
            Stage::Completion => "completion",
            Stage::Oracle => "oracle",
        })
    }
}

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{stage} call failed: {source}")]
    ExternalCall {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} timed out")]
    Timeout { stage: Stage },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("alert delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),
}

impl SentinelError {
    pub fn external(stage: Stage, source: anyhow::Error) -> Self {
        SentinelError::ExternalCall { stage, source }
    }
}

impl From<IndexError> for SentinelError {
    fn from(err: IndexError) -> Self {
        SentinelError::Configuration(err.to_string())
    }
}
