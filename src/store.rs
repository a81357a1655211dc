//! SQLite-backed vector store.
//!
//! Persists chunks and their embedding vectors in a single table keyed by
//! `content_id`, with upsert-on-conflict semantics so re-ingestion of the
//! same document overwrites rather than duplicates. Similarity search
//! fetches candidate vectors and computes cosine similarity in Rust,
//! the same way context retrieval works against small-to-medium corpora.
//!
//! The embedding dimension is pinned per deployment: the first upsert
//! records the vector width in `index_meta`, and later upserts or searches
//! with a different width fail fast instead of silently mixing models.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::RagError;
use crate::models::{ContentChunk, Metadata, SimilarityResult};

const DIMS_META_KEY: &str = "embedding_dims";

/// Handle over a bounded SQLite connection pool.
///
/// Cloning is cheap; all clones share the pool. Every operation acquires
/// and releases a pooled connection per call.
#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open (or create) the database file and its connection pool.
    pub async fn connect(db_path: &Path) -> Result<Self, RagError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::Store(format!("create db directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| RagError::Store(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables and indexes. Idempotent.
    pub async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_embeddings (
                content_id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                hash TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_embeddings_source_path \
             ON content_embeddings(source_path)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update a chunk and its embedding, keyed by `content_id`.
    ///
    /// Atomic upsert: content, metadata, embedding, hash, and timestamp are
    /// all replaced on conflict.
    pub async fn upsert(&self, chunk: &ContentChunk, embedding: &[f32]) -> Result<(), RagError> {
        self.pin_dims(embedding.len()).await?;

        let metadata = serde_json::Value::Object(chunk.metadata.clone()).to_string();
        let blob = vec_to_blob(embedding);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO content_embeddings
                (content_id, source_path, chunk_index, text, metadata, embedding, hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                source_path = excluded.source_path,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                hash = excluded.hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&chunk.content_id)
        .bind(&chunk.source_path)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&metadata)
        .bind(&blob)
        .bind(&chunk.hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(content_id = %chunk.content_id, "stored embedding");
        Ok(())
    }

    /// Return up to `limit` rows whose cosine similarity to the query is
    /// strictly greater than `threshold`, ordered by descending similarity.
    /// Ties keep insertion order.
    pub async fn similarity_search(
        &self,
        query_embedding: &[f32],
        limit: i64,
        threshold: f64,
    ) -> Result<Vec<SimilarityResult>, RagError> {
        if let Some(dims) = self.pinned_dims().await? {
            if query_embedding.len() != dims {
                return Err(RagError::Store(format!(
                    "query embedding has {} dims but the index is pinned to {}",
                    query_embedding.len(),
                    dims
                )));
            }
        }

        let rows = sqlx::query(
            "SELECT content_id, source_path, text, metadata, embedding \
             FROM content_embeddings ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results: Vec<SimilarityResult> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_embedding, &blob_to_vec(&blob)) as f64;
                if similarity > threshold {
                    Some(SimilarityResult {
                        content_id: row.get("content_id"),
                        source_path: row.get("source_path"),
                        text: row.get("text"),
                        metadata: parse_metadata(row.get("metadata")),
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit.max(0) as usize);

        Ok(results)
    }

    /// Exact-match filter on one metadata field. No ranking; ordered by
    /// `content_id`.
    pub async fn get_by_metadata_field(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Vec<ContentChunk>, RagError> {
        if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RagError::Store(format!(
                "invalid metadata field name: '{}'",
                field
            )));
        }

        let rows = sqlx::query(
            "SELECT content_id, source_path, chunk_index, text, metadata, hash \
             FROM content_embeddings \
             WHERE json_extract(metadata, ?) = ? \
             ORDER BY content_id",
        )
        .bind(format!("$.{}", field))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ContentChunk {
                content_id: row.get("content_id"),
                source_path: row.get("source_path"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                metadata: parse_metadata(row.get("metadata")),
                hash: row.get("hash"),
            })
            .collect())
    }

    /// Stored content hash for a chunk, if present. Used to skip
    /// re-embedding unchanged chunks.
    pub async fn chunk_hash(&self, content_id: &str) -> Result<Option<String>, RagError> {
        let hash =
            sqlx::query_scalar("SELECT hash FROM content_embeddings WHERE content_id = ?")
                .bind(content_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    /// Total number of stored embeddings.
    pub async fn embedding_count(&self) -> Result<i64, RagError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM content_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Record the deployment's embedding width on first write; reject a
    /// different width afterwards.
    async fn pin_dims(&self, dims: usize) -> Result<(), RagError> {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING")
            .bind(DIMS_META_KEY)
            .bind(dims.to_string())
            .execute(&self.pool)
            .await?;

        match self.pinned_dims().await? {
            Some(pinned) if pinned != dims => Err(RagError::Store(format!(
                "embedding has {} dims but the index is pinned to {}",
                dims, pinned
            ))),
            _ => Ok(()),
        }
    }

    async fn pinned_dims(&self) -> Result<Option<usize>, RagError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIMS_META_KEY)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }
}

fn parse_metadata(raw: String) -> Metadata {
    serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}
