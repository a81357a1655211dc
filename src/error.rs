//! Error taxonomy for the pipeline.
//!
//! Library code returns [`RagError`]; the CLI boundary converts into
//! `anyhow::Error` for reporting. [`RagError::RateLimited`] carries its
//! classification so callers can react to daily windows differently from
//! per-minute ones.

use thiserror::Error;

use crate::models::RateLimitKind;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Every embedding tier failed (or none is configured).
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vector store failure: connection, schema, query, or a dimension
    /// mismatch against the pinned index width.
    #[error("store error: {0}")]
    Store(String),

    /// The completion provider rejected the request with a rate limit.
    #[error("rate limited ({kind}), retry after {retry_after_secs:?}s")]
    RateLimited {
        kind: RateLimitKind,
        retry_after_secs: Option<u64>,
    },

    /// Any non-rate-limit completion failure: transport, bad status,
    /// malformed response body.
    #[error("completion failed: {0}")]
    CompletionFailed(String),

    /// A corpus document or path could not be read.
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        RagError::Store(e.to_string())
    }
}
