//! # Ragline
//!
//! A retrieval-augmented generation (RAG) pipeline that turns a corpus of
//! text documents into queryable knowledge and produces grounded
//! conversational answers.
//!
//! ## Architecture
//!
//! ```text
//! ingestion:  corpus ──▶ chunker ──▶ embedding ──▶ store
//!
//! query:      embedding ──▶ store ──▶ context ──▶ completion
//!                  └──────────────────────┬──────────┘
//!                                    pipeline
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`chunker`] | Paragraph-boundary text chunking |
//! | [`corpus`] | Document enumeration and metadata extraction |
//! | [`embedding`] | Embedding tiers with local→remote fallback |
//! | [`store`] | SQLite vector store |
//! | [`context`] | Retrieval and prompt formatting |
//! | [`completion`] | Chat-completion client, rate-limit classification |
//! | [`pipeline`] | Top-level façade: process corpus, chat, status |

pub mod chunker;
pub mod completion;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;

pub use error::{RagError, Result};
pub use pipeline::RagPipeline;
