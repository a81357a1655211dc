//! Top-level pipeline façade: corpus ingestion and grounded chat.
//!
//! [`RagPipeline`] wires the chunker, embedding chain, vector store,
//! context builder, and completion client together. Components are
//! constructed once and passed in by handle; nothing here re-initializes
//! on a per-call basis.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chunker::chunk_document;
use crate::completion::{CompletionClient, SERVICE_TROUBLE_REPLY};
use crate::config::Config;
use crate::context::ContextBuilder;
use crate::corpus;
use crate::embedding::EmbeddingService;
use crate::error::RagError;
use crate::models::{ChatReply, CorpusStats, IndexStatus, SourceRef};
use crate::store::VectorStore;

pub struct RagPipeline {
    config: Config,
    store: VectorStore,
    embedder: Arc<EmbeddingService>,
    context: ContextBuilder,
    completion: CompletionClient,
}

impl RagPipeline {
    /// Construct the pipeline from configuration: open the store, build
    /// the embedding chain, and resolve completion credentials.
    pub async fn new(config: Config) -> Result<Self, RagError> {
        let store = VectorStore::connect(&config.db.path).await?;
        store.init_schema().await?;

        let embedder = Arc::new(EmbeddingService::from_config(&config.embedding));
        let context = ContextBuilder::new(Arc::clone(&embedder), store.clone());
        let completion = CompletionClient::from_config(&config.completion)?;

        Ok(Self {
            config,
            store,
            embedder,
            context,
            completion,
        })
    }

    /// Ingest the whole corpus: enumerate documents, chunk, embed, upsert.
    ///
    /// Partial-failure semantics: an unreadable document or a failed chunk
    /// is counted and the run continues. With `force_refresh` false,
    /// chunks whose stored content hash is unchanged are left alone.
    pub async fn process_corpus(&self, force_refresh: bool) -> Result<CorpusStats, RagError> {
        let paths = corpus::scan_corpus(&self.config)
            .map_err(|e| RagError::ContentUnavailable(e.to_string()))?;
        info!(documents = paths.len(), "processing corpus");

        let mut stats = CorpusStats::default();

        for relative_path in &paths {
            let content = match corpus::load_document(&self.config.corpus.root, relative_path) {
                Ok(c) => c,
                Err(e) => {
                    error!("skipping document: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            let metadata = corpus::extract_metadata(&content, relative_path);
            let doc_id = corpus::document_id(relative_path);
            let chunks = chunk_document(
                &doc_id,
                relative_path,
                &content,
                &metadata,
                self.config.chunking.max_chars,
            );

            let mut pending = Vec::new();
            for chunk in &chunks {
                if !force_refresh {
                    match self.store.chunk_hash(&chunk.content_id).await {
                        Ok(Some(stored)) if stored == chunk.hash => {
                            stats.up_to_date += 1;
                            continue;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(content_id = %chunk.content_id, "hash lookup failed: {}", e);
                        }
                    }
                }
                pending.push(chunk);
            }

            let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.batch_embed(&texts).await;

            for (chunk, vector) in pending.into_iter().zip(vectors) {
                let Some(embedding) = vector else {
                    warn!(content_id = %chunk.content_id, "embedding skipped");
                    stats.skipped += 1;
                    continue;
                };

                match self.store.upsert(chunk, &embedding).await {
                    Ok(()) => stats.embedded += 1,
                    Err(e) => {
                        error!(content_id = %chunk.content_id, "upsert failed: {}", e);
                        stats.errors += 1;
                    }
                }
            }

            stats.processed += 1;
            info!(path = %relative_path, chunks = chunks.len(), "processed document");
        }

        info!(?stats, "corpus processing complete");
        Ok(stats)
    }

    /// Answer a query grounded in retrieved context.
    ///
    /// Rate limits propagate as [`RagError::RateLimited`] so the caller
    /// can distinguish daily from per-minute windows; any other completion
    /// failure collapses to a fixed apology rather than leaking transport
    /// detail to the end user.
    pub async fn chat(&self, query: &str) -> Result<ChatReply, RagError> {
        let results = self
            .context
            .retrieve_context(
                query,
                self.config.retrieval.max_results,
                self.config.retrieval.threshold,
            )
            .await?;

        let context_block = self.context.format_context(&results);

        let response = match self
            .completion
            .generate_response(
                query,
                &context_block,
                self.config.completion.temperature,
                self.config.completion.max_tokens,
            )
            .await
        {
            Ok(text) => text,
            Err(e @ RagError::RateLimited { .. }) => return Err(e),
            Err(e) => {
                error!("completion failed: {}", e);
                SERVICE_TROUBLE_REPLY.to_string()
            }
        };

        let sources = results
            .iter()
            .map(|r| SourceRef {
                content_id: r.content_id.clone(),
                source_path: r.source_path.clone(),
                content_type: r
                    .metadata
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("content")
                    .to_string(),
                similarity: r.similarity,
            })
            .collect();

        Ok(ChatReply {
            response,
            sources,
            context_used: !results.is_empty(),
        })
    }

    /// Readiness snapshot: embedding count plus whether the completion
    /// credential is configured.
    pub async fn status(&self) -> Result<IndexStatus, RagError> {
        let embedding_count = self.store.embedding_count().await?;
        Ok(IndexStatus {
            embedding_count,
            ready: embedding_count > 0 && self.completion.is_configured(),
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
