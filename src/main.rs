//! # Ragline CLI
//!
//! Command-line front end over the RAG pipeline.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline init` | Create the SQLite database and schema |
//! | `ragline process` | Chunk, embed, and index the corpus |
//! | `ragline chat "<query>"` | Ask a question grounded in the corpus |
//! | `ragline status` | Show embedding count and readiness |
//! | `ragline show <type>` | List indexed chunks of one content type |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragline::error::RagError;
use ragline::{config, RagPipeline};

/// Ragline — a retrieval-augmented generation pipeline for text corpora.
#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Chunk, embed, and query a text corpus with grounded chat answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables.
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Process the corpus: chunk, embed, and store every document.
    ///
    /// Individual failures are counted, never fatal: unreadable documents
    /// and failed chunks are reported in the final statistics.
    Process {
        /// Re-embed every chunk, ignoring stored content hashes.
        #[arg(long)]
        force: bool,
    },

    /// Ask a question answered from the indexed corpus.
    Chat {
        /// The question to ask.
        query: String,
    },

    /// Show embedding count and readiness.
    Status,

    /// List indexed chunks with the given content type
    /// (e.g. `section`, `skill`, `project`, `knowledge`).
    Show {
        /// Metadata `type` value to filter on.
        content_type: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pipeline = RagPipeline::new(cfg).await?;
            pipeline.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Process { force } => {
            let pipeline = RagPipeline::new(cfg).await?;
            let stats = pipeline.process_corpus(force).await?;
            println!("process corpus");
            println!("  documents processed: {}", stats.processed);
            println!("  chunks embedded:     {}", stats.embedded);
            println!("  chunks up to date:   {}", stats.up_to_date);
            println!("  chunks skipped:      {}", stats.skipped);
            println!("  errors:              {}", stats.errors);
            pipeline.close().await;
        }
        Commands::Chat { query } => {
            let pipeline = RagPipeline::new(cfg).await?;
            match pipeline.chat(&query).await {
                Ok(reply) => {
                    println!("{}", reply.response);
                    if reply.context_used {
                        println!();
                        println!("sources:");
                        for source in &reply.sources {
                            println!(
                                "  [{:.2}] {} ({})",
                                source.similarity, source.source_path, source.content_type
                            );
                        }
                    }
                }
                Err(RagError::RateLimited {
                    kind,
                    retry_after_secs,
                }) => {
                    if kind.is_daily() {
                        println!(
                            "The AI service has hit its daily limit ({}). Please try again tomorrow.",
                            kind
                        );
                    } else {
                        match retry_after_secs {
                            Some(secs) => println!(
                                "The AI service is rate limited ({}). Try again in about {}s.",
                                kind, secs
                            ),
                            None => println!(
                                "The AI service is rate limited ({}). Try again shortly.",
                                kind
                            ),
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
            pipeline.close().await;
        }
        Commands::Status => {
            let pipeline = RagPipeline::new(cfg).await?;
            let status = pipeline.status().await?;
            println!("ragline status");
            println!("  embeddings: {}", status.embedding_count);
            println!("  ready:      {}", status.ready);
            pipeline.close().await;
        }
        Commands::Show { content_type } => {
            let pipeline = RagPipeline::new(cfg).await?;
            let chunks = pipeline
                .store()
                .get_by_metadata_field("type", &content_type)
                .await?;
            if chunks.is_empty() {
                println!("No chunks with type '{}'.", content_type);
            } else {
                for chunk in &chunks {
                    let excerpt: String = chunk.text.chars().take(80).collect();
                    println!(
                        "{} ({}): {}",
                        chunk.content_id,
                        chunk.source_path,
                        excerpt.replace('\n', " ")
                    );
                }
            }
            pipeline.close().await;
        }
    }

    Ok(())
}
