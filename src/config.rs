use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Root directory of the source documents.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Character budget per chunk. A single paragraph longer than this is
    /// kept as one oversized chunk rather than split.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: i64,
    /// Minimum similarity a result must strictly exceed.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            threshold: default_threshold(),
        }
    }
}

fn default_max_results() -> i64 {
    5
}
fn default_threshold() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Whether the local (offline) tier is attempted first.
    #[serde(default = "default_true")]
    pub local_enabled: bool,
    /// Local model name (fastembed naming, e.g. `all-minilm-l6-v2`).
    #[serde(default = "default_local_model")]
    pub local_model: String,
    /// Remote fallback model (OpenAI-style embeddings API).
    #[serde(default = "default_remote_model")]
    pub remote_model: String,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    /// Environment variable holding the remote tier's API key.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on concurrent embed calls during batch ingestion.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_model: default_local_model(),
            remote_model: default_remote_model(),
            remote_url: default_remote_url(),
            api_key_env: default_embedding_key_env(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_local_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_remote_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_remote_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_completion_url")]
    pub api_url: String,
    /// Environment variable holding the completion API key.
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// System persona injected as the first message of every request.
    #[serde(default = "default_persona")]
    pub persona: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            api_url: default_completion_url(),
            api_key_env: default_completion_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            persona: default_persona(),
        }
    }
}

fn default_completion_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_completion_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_completion_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_persona() -> String {
    "You are an assistant that answers questions using the provided context. \
     If the context does not cover a question, say so rather than guessing. \
     Be accurate, concise, and conversational."
        .to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }

    if !(-1.0..=1.0).contains(&config.retrieval.threshold) {
        anyhow::bail!("retrieval.threshold must be in [-1.0, 1.0]");
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        anyhow::bail!("completion.temperature must be in [0.0, 2.0]");
    }

    if config.embedding.max_concurrency == 0 {
        anyhow::bail!("embedding.max_concurrency must be > 0");
    }

    Ok(config)
}
