//! Embedding provider abstraction and fallback chain.
//!
//! Defines the [`EmbeddingBackend`] trait and two concrete tiers:
//! - **[`LocalBackend`]** — runs a fastembed model in-process; the model is
//!   downloaded on first use and cached for the life of the process.
//! - **[`RemoteBackend`]** — calls an OpenAI-style `/v1/embeddings` API;
//!   requires an API key in the environment.
//!
//! [`EmbeddingService`] holds the tiers as an ordered chain and tries each
//! in turn until one produces a vector. A single [`embed`](EmbeddingService::embed)
//! call fails with `EmbeddingUnavailable` only when every tier fails;
//! [`batch_embed`](EmbeddingService::batch_embed) degrades per-slot instead.
//!
//! Also provides the vector utilities used by the store:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB encoding

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::RagError;

/// One embedding tier: converts text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Tier label used in logs (e.g. `"local"`, `"remote"`).
    fn name(&self) -> &str;

    /// Vector dimensionality this tier produces.
    fn dims(&self) -> usize;

    /// Embed a single normalized text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Ordered fallback chain over embedding tiers.
pub struct EmbeddingService {
    backends: Vec<Box<dyn EmbeddingBackend>>,
    max_concurrency: usize,
    active_dims: OnceLock<usize>,
}

impl EmbeddingService {
    /// Build the tier chain from configuration: local first (when enabled
    /// and compiled in), then remote. A tier that cannot be constructed is
    /// skipped with a warning rather than failing the whole service.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut backends: Vec<Box<dyn EmbeddingBackend>> = Vec::new();

        #[cfg(feature = "local-embeddings")]
        if config.local_enabled {
            match LocalBackend::new(config) {
                Ok(b) => backends.push(Box::new(b)),
                Err(e) => warn!("local embedding tier unavailable: {}", e),
            }
        }

        match RemoteBackend::new(config) {
            Ok(b) => backends.push(Box::new(b)),
            Err(e) => warn!("remote embedding tier unavailable: {}", e),
        }

        Self {
            backends,
            max_concurrency: config.max_concurrency,
            active_dims: OnceLock::new(),
        }
    }

    /// Dimensionality of the tier that last produced a vector, once known.
    pub fn active_dims(&self) -> Option<usize> {
        self.active_dims.get().copied()
    }

    /// Embed one text, trying each tier in order.
    ///
    /// Input is normalized first (newlines collapsed to spaces, surrounding
    /// whitespace trimmed); empty normalized text short-circuits to failure
    /// without any network call.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(RagError::EmbeddingUnavailable(
                "empty text after normalization".to_string(),
            ));
        }

        let mut last_err: Option<String> = None;

        for backend in &self.backends {
            match backend.embed(&normalized).await {
                Ok(vector) => {
                    let _ = self.active_dims.set(vector.len());
                    debug!(tier = backend.name(), dims = vector.len(), "embedded text");
                    return Ok(vector);
                }
                Err(e) => {
                    warn!(tier = backend.name(), "embedding tier failed: {}", e);
                    last_err = Some(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(RagError::EmbeddingUnavailable(last_err.unwrap_or_else(
            || "no embedding backend configured".to_string(),
        )))
    }

    /// Embed a batch of texts as independent concurrent calls, gated by a
    /// semaphore of `max_concurrency` permits. A failed slot yields `None`;
    /// the batch itself never fails.
    pub async fn batch_embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let futures = texts.iter().map(|text| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                self.embed(text).await.ok()
            }
        });

        futures::future::join_all(futures).await
    }
}

/// Collapse newlines to spaces and trim surrounding whitespace.
fn normalize(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}

// ============ Local tier (fastembed) ============

/// In-process embedding via fastembed.
///
/// The model instance is expensive to construct (first use downloads the
/// weights), so it lives in a process-wide slot guarded by a mutex: exactly
/// one initialization, and inference serialized through the same lock that
/// fastembed's `&mut self` API requires anyway.
#[cfg(feature = "local-embeddings")]
pub struct LocalBackend {
    model: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings")]
static LOCAL_MODEL: std::sync::Mutex<Option<fastembed::TextEmbedding>> =
    std::sync::Mutex::new(None);

#[cfg(feature = "local-embeddings")]
impl LocalBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        // Validate the model name up front so a typo fails at startup.
        to_fastembed_model(&config.local_model)?;
        let dims = local_model_dims(&config.local_model);
        Ok(Self {
            model: config.local_model.clone(),
            dims,
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let model_name = to_fastembed_model(&self.model)?;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = LOCAL_MODEL.lock().map_err(|_| {
                RagError::EmbeddingUnavailable("local model lock poisoned".to_string())
            })?;

            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model_name).with_show_download_progress(false),
                )
                .map_err(|e| {
                    RagError::EmbeddingUnavailable(format!(
                        "failed to initialize local model: {}",
                        e
                    ))
                })?;
                *guard = Some(model);
            }

            let Some(model) = guard.as_mut() else {
                return Err(RagError::EmbeddingUnavailable(
                    "local model slot empty after init".to_string(),
                ));
            };

            let mut embeddings = model
                .embed(vec![text], None)
                .map_err(|e| RagError::EmbeddingUnavailable(format!("local embed: {}", e)))?;

            embeddings.pop().ok_or_else(|| {
                RagError::EmbeddingUnavailable("empty local embedding response".to_string())
            })
        })
        .await
        .map_err(|e| RagError::EmbeddingUnavailable(format!("local embed task: {}", e)))?
    }
}

#[cfg(feature = "local-embeddings")]
fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, RagError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => Err(RagError::EmbeddingUnavailable(format!(
            "unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
fn local_model_dims(name: &str) -> usize {
    match name {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        _ => 384,
    }
}

// ============ Remote tier (OpenAI-style API) ============

/// Embedding via an OpenAI-style embeddings endpoint.
///
/// The API key is resolved from the environment at construction; calls
/// fail without touching the network when no key is configured.
pub struct RemoteBackend {
    model: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::EmbeddingUnavailable(format!("http client: {}", e)))?;

        Ok(Self {
            model: config.remote_model.clone(),
            url: config.remote_url.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn dims(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(RagError::EmbeddingUnavailable(
                "remote embedding API key not configured".to_string(),
            ));
        };

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "encoding_format": "float",
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("remote embed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "remote embed API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("remote embed body: {}", e)))?;

        parse_embeddings_response(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI-style embeddings response.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<f32>, RagError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::EmbeddingUnavailable("invalid embeddings response shape".to_string())
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_newlines() {
        assert_eq!(normalize("  a\nb\r\nc  "), "a b  c");
        assert_eq!(normalize("\n\n"), "");
    }

    #[tokio::test]
    async fn test_embed_empty_text_short_circuits() {
        // No backends needed: the empty check fires first.
        let service = EmbeddingService {
            backends: Vec::new(),
            max_concurrency: 1,
            active_dims: OnceLock::new(),
        };
        let err = service.embed("   \n  ").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fallback_chain_order_and_failure() {
        struct Fixed(Vec<f32>);
        #[async_trait]
        impl EmbeddingBackend for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            fn dims(&self) -> usize {
                self.0.len()
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
                Ok(self.0.clone())
            }
        }

        struct Failing;
        #[async_trait]
        impl EmbeddingBackend for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn dims(&self) -> usize {
                0
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
                Err(RagError::EmbeddingUnavailable("down".to_string()))
            }
        }

        // First tier fails, second succeeds.
        let service = EmbeddingService {
            backends: vec![Box::new(Failing), Box::new(Fixed(vec![1.0, 0.0]))],
            max_concurrency: 2,
            active_dims: OnceLock::new(),
        };
        let v = service.embed("hello").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
        assert_eq!(service.active_dims(), Some(2));

        // All tiers fail.
        let service = EmbeddingService {
            backends: vec![Box::new(Failing)],
            max_concurrency: 1,
            active_dims: OnceLock::new(),
        };
        assert!(service.embed("hello").await.is_err());
    }

    #[tokio::test]
    async fn test_batch_embed_partial_failure() {
        struct EchoLen;
        #[async_trait]
        impl EmbeddingBackend for EchoLen {
            fn name(&self) -> &str {
                "echo"
            }
            fn dims(&self) -> usize {
                1
            }
            async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
                if text.starts_with("bad") {
                    Err(RagError::EmbeddingUnavailable("bad input".to_string()))
                } else {
                    Ok(vec![text.len() as f32])
                }
            }
        }

        let service = EmbeddingService {
            backends: vec![Box::new(EchoLen)],
            max_concurrency: 2,
            active_dims: OnceLock::new(),
        };

        let texts = vec![
            "hello".to_string(),
            "bad one".to_string(),
            "world!".to_string(),
        ];
        let results = service.batch_embed(&texts).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Some(vec![5.0]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], Some(vec![6.0]));
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical_orthogonal_opposite() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);

        let c = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_embeddings_response() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.25, -0.5, 1.0]}]
        });
        let v = parse_embeddings_response(&json).unwrap();
        assert_eq!(v, vec![0.25, -0.5, 1.0]);

        let bad = serde_json::json!({"data": []});
        assert!(parse_embeddings_response(&bad).is_err());
    }
}
