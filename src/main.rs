//! # legal-rag CLI (`lrag`)
//!
//! ## Usage
//!
//! ```bash
//! lrag --config ./config/lrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lrag init` | Create extensions, tables, and indexes in PostgreSQL |
//! | `lrag node create\|list\|delete` | Manage knowledge nodes |
//! | `lrag ingest <node> <file>` | Chunk and embed an extracted text file |
//! | `lrag embed pending` | Backfill embeddings of pending or failed documents |
//! | `lrag ask <node> "<question>"` | Answer a question with citations |
//! | `lrag serve` | Start the HTTP server |
//! | `lrag completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! lrag init
//! lrag node create locazioni --description "Contratti di locazione"
//! lrag ingest locazioni ./testi/contratto_tipo.txt --preset contract
//! lrag ask locazioni "Qual e' la durata minima di una locazione commerciale?"
//! lrag ask locazioni "..." --provider anthropic --model claude-3-5-haiku-latest --json
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use legal_rag::ask::{self, AskOverrides};
use legal_rag::{config, embed_cmd, ingest, logging, migrate, nodes, server};
use legal_rag_core::chunk::ChunkPreset;

/// legal-rag: retrieval-augmented answers over a legal knowledge base.
#[derive(Parser)]
#[command(
    name = "lrag",
    about = "legal-rag: grounded, cited answers over legal documents",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/lrag.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Manage knowledge nodes.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Ingest an extracted UTF-8 text file into a node.
    Ingest {
        /// Node id or name.
        node: String,
        file: PathBuf,
        /// Chunk preset: default, statute, contract, faq.
        #[arg(long)]
        preset: Option<ChunkPreset>,
        /// MIME type to record (guessed from the extension otherwise).
        #[arg(long)]
        mime: Option<String>,
    },

    /// Embedding maintenance.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Answer a question against a node.
    Ask {
        /// Node id or name.
        node: String,
        question: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        return_k: Option<usize>,
        /// Vector weight in hybrid fusion, 0.0 to 1.0.
        #[arg(long)]
        alpha: Option<f64>,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum NodeAction {
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
    /// Delete a node with all its documents, chunks, and embeddings.
    Delete {
        /// Node id or name.
        node: String,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed documents left pending or failed by ingestion.
    Pending {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "lrag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Node { action } => match action {
            NodeAction::Create { name, description } => {
                nodes::run_create(&cfg, &name, description.as_deref()).await?;
            }
            NodeAction::List => {
                nodes::run_list(&cfg).await?;
            }
            NodeAction::Delete { node } => {
                nodes::run_delete(&cfg, &node).await?;
            }
        },
        Commands::Ingest {
            node,
            file,
            preset,
            mime,
        } => {
            ingest::run_ingest(&cfg, &node, &file, preset, mime).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                embed_cmd::run_embed_pending(&cfg, limit, dry_run).await?;
            }
        },
        Commands::Ask {
            node,
            question,
            provider,
            model,
            temperature,
            max_tokens,
            top_k,
            return_k,
            alpha,
            json,
        } => {
            let overrides = AskOverrides {
                provider,
                model,
                temperature,
                max_tokens,
                top_k,
                return_k,
                alpha,
            };
            ask::run_ask(&cfg, &node, &question, overrides, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
