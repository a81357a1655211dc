//! Context retrieval and prompt formatting.
//!
//! [`ContextBuilder`] turns a user query into a prompt-ready context block:
//! embed the query, search the store, and format the hits. A query whose
//! embedding fails degrades to an empty result set rather than an error,
//! so the chat flow continues with the no-context sentinel.

use std::sync::Arc;
use tracing::{info, warn};

use crate::embedding::EmbeddingService;
use crate::error::RagError;
use crate::models::SimilarityResult;
use crate::store::VectorStore;

/// Fixed sentinel used when no relevant context was retrieved, so the
/// downstream prompt always receives a well-formed instruction.
pub const NO_CONTEXT_SENTINEL: &str = "No specific context available.";

pub struct ContextBuilder {
    embedder: Arc<EmbeddingService>,
    store: VectorStore,
}

impl ContextBuilder {
    pub fn new(embedder: Arc<EmbeddingService>, store: VectorStore) -> Self {
        Self { embedder, store }
    }

    /// Retrieve the chunks most similar to `query`.
    ///
    /// Embedding failure returns an empty result set, not an error; store
    /// failures still propagate.
    pub async fn retrieve_context(
        &self,
        query: &str,
        max_results: i64,
        threshold: f64,
    ) -> Result<Vec<SimilarityResult>, RagError> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("could not embed query, returning empty context: {}", e);
                return Ok(Vec::new());
            }
        };

        let results = self
            .store
            .similarity_search(&query_embedding, max_results, threshold)
            .await?;

        info!(count = results.len(), "retrieved context for query");
        Ok(results)
    }

    /// Format retrieved chunks as a numbered, human-readable context block.
    ///
    /// Each entry is labeled with its `type` metadata (title-cased), its
    /// `section` if present, and its similarity rounded to two decimals.
    pub fn format_context(&self, results: &[SimilarityResult]) -> String {
        format_context(results)
    }
}

pub fn format_context(results: &[SimilarityResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    let mut formatted = String::from("Relevant background information:\n\n");

    for (i, result) in results.iter().enumerate() {
        let content_type = result
            .metadata
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("content");
        let section = result
            .metadata
            .get("section")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        formatted.push_str(&format!("{}. [{}] ", i + 1, title_case(content_type)));
        if !section.is_empty() {
            formatted.push_str(&format!("({}) ", section));
        }
        formatted.push_str(&format!("(relevance: {:.2})\n", result.similarity));
        formatted.push_str(&result.text);
        formatted.push_str("\n\n");
    }

    formatted
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
