//! # docqa CLI
//!
//! The `docqa` binary ingests documents, answers questions about them, and
//! serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest <file> --owner <id>` | Extract, chunk, and store a PDF/DOCX/TXT file |
//! | `docqa documents list --owner <id>` | List an owner's documents |
//! | `docqa documents get <id> --owner <id>` | Show a document and its chunks |
//! | `docqa documents delete <id> --owner <id>` | Delete a document |
//! | `docqa ask "<query>" --owner <id>` | Answer a question from the owner's documents |
//! | `docqa queries recent --owner <id>` | Recent queries |
//! | `docqa queries get <id> --owner <id>` | One query with its result |
//! | `docqa queries stats --owner <id>` | Query statistics |
//! | `docqa serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{answer, config, documents, ingest, migrate, queries, server};

/// docqa: document question answering over your own files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: ingest documents and answer questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a PDF, DOCX, or TXT file.
    Ingest {
        /// File to ingest.
        file: PathBuf,

        /// Owner identity for the document.
        #[arg(long)]
        owner: String,
    },

    /// Manage ingested documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Ask a question about the owner's documents.
    Ask {
        /// The question (1-1000 characters).
        query: String,

        /// Owner identity whose documents are searched.
        #[arg(long)]
        owner: String,

        /// Optional free-text context (at most 500 characters).
        #[arg(long)]
        context: Option<String>,
    },

    /// Inspect query history.
    Queries {
        #[command(subcommand)]
        action: QueriesAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List documents, newest first.
    List {
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one document.
    Get {
        id: String,

        #[arg(long)]
        owner: String,
    },
    /// Delete a document and its chunks.
    Delete {
        id: String,

        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum QueriesAction {
    /// Most recent queries, newest first.
    Recent {
        #[arg(long)]
        owner: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show one query and its result.
    Get {
        id: String,

        #[arg(long)]
        owner: String,
    },
    /// Totals and average confidence.
    Stats {
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, owner } => {
            ingest::run_ingest(&cfg, &file, &owner).await?;
        }
        Commands::Documents { action } => match action {
            DocumentsAction::List {
                owner,
                limit,
                offset,
            } => {
                documents::run_list(&cfg, &owner, limit, offset).await?;
            }
            DocumentsAction::Get { id, owner } => {
                documents::run_get(&cfg, &owner, &id).await?;
            }
            DocumentsAction::Delete { id, owner } => {
                documents::run_delete(&cfg, &owner, &id).await?;
            }
        },
        Commands::Ask {
            query,
            owner,
            context,
        } => {
            answer::run_ask(&cfg, &owner, &query, context).await?;
        }
        Commands::Queries { action } => match action {
            QueriesAction::Recent { owner, limit } => {
                queries::run_recent(&cfg, &owner, limit).await?;
            }
            QueriesAction::Get { id, owner } => {
                queries::run_get(&cfg, &owner, &id).await?;
            }
            QueriesAction::Stats { owner } => {
                queries::run_stats(&cfg, &owner).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
