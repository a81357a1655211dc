//! Core data models used throughout the pipeline.
//!
//! These types represent the chunks, retrieval results, and run statistics
//! that flow through ingestion and query paths.

use serde::Serialize;

/// Open-ended metadata bag attached to chunks.
///
/// Well-known optional keys: `type`, `section`, `category`, `title`,
/// `content_hash`. Anything else (e.g. frontmatter fields) rides along.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A bounded unit of document text, ready for embedding and storage.
///
/// `content_id` is derived deterministically from the source path and
/// chunk index, so re-ingesting the same document upserts the same rows.
#[derive(Debug, Clone)]
pub struct ContentChunk {
    pub content_id: String,
    pub source_path: String,
    pub text: String,
    pub metadata: Metadata,
    pub chunk_index: i64,
    /// SHA-256 of the chunk text, used for staleness detection.
    pub hash: String,
}

/// A row returned from a similarity search, ordered by descending score.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub content_id: String,
    pub source_path: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f64,
}

/// Which rate-limit window a 429 response referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    TokensPerMinute,
    RequestsPerMinute,
    TokensPerDay,
    RequestsPerDay,
    Unknown,
}

impl RateLimitKind {
    /// True for daily windows, where waiting a minute won't help.
    pub fn is_daily(&self) -> bool {
        matches!(
            self,
            RateLimitKind::TokensPerDay | RateLimitKind::RequestsPerDay
        )
    }
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RateLimitKind::TokensPerMinute => "TPM",
            RateLimitKind::RequestsPerMinute => "RPM",
            RateLimitKind::TokensPerDay => "TPD",
            RateLimitKind::RequestsPerDay => "RPD",
            RateLimitKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Transient classification of a 429 error payload. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub kind: RateLimitKind,
    pub retry_after_secs: Option<u64>,
}

/// Statistics from a corpus ingestion run.
///
/// The run never aborts early: per-document and per-chunk failures are
/// counted here and processing continues.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    /// Documents successfully read and chunked.
    pub processed: u64,
    /// Chunks embedded and stored.
    pub embedded: u64,
    /// Chunks whose embedding failed (no vector produced).
    pub skipped: u64,
    /// Chunks whose upsert failed, plus unreadable documents.
    pub errors: u64,
    /// Chunks left untouched because their content hash was unchanged.
    pub up_to_date: u64,
}

/// One source descriptor per retrieved chunk in a chat reply.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub content_id: String,
    pub source_path: String,
    pub content_type: String,
    pub similarity: f64,
}

/// Assembled answer from the chat path.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub context_used: bool,
}

/// Readiness snapshot exposed to external collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub embedding_count: i64,
    /// Requires a non-zero embedding count and a configured completion key.
    pub ready: bool,
}
