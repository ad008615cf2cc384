//! # semdex CLI (`sdx`)
//!
//! The `sdx` binary is the interface to a semdex repository. It provides
//! commands for repository initialization, incremental indexing, semantic
//! search, and index inspection.
//!
//! ## Usage
//!
//! ```bash
//! sdx --config ./semdex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the `.semdex` repository |
//! | `sdx index <path>` | Index a file or directory tree incrementally |
//! | `sdx search "<query>"` | Rank indexed chunks by cosine similarity |
//! | `sdx status` | Show file, chunk, and storage counts |
//! | `sdx list` | List tracked files |
//!
//! ## Examples
//!
//! ```bash
//! # Create a repository in the current directory
//! sdx init
//!
//! # Index the whole tree
//! sdx index .
//!
//! # Reindex everything regardless of change detection
//! sdx index . --force
//!
//! # Restrict a run to Markdown files
//! sdx index docs --extensions .md
//!
//! # Search, machine-readable
//! sdx search "database migrations" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use semdex::config;
use semdex::embedding::create_provider;
use semdex::indexer::{IndexOptions, Indexer};
use semdex::progress::ProgressMode;
use semdex::repo::Repository;
use semdex::stats;

/// semdex — an incremental semantic file indexer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing config files fall back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "semdex — incremental semantic indexing and search for local files",
    version,
    long_about = "semdex indexes a directory tree incrementally: changed files are detected \
    by size, mtime, and content hash, chunked, embedded, and stored in a .semdex repository. \
    Search ranks every indexed chunk by cosine similarity against the query."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./semdex.toml`. Chunking, embedding, and indexing
    /// settings are read from this file; a missing file means defaults.
    #[arg(long, global = true, default_value = "./semdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a `.semdex` repository.
    ///
    /// Creates the repository directory with its index, embeddings, and
    /// metadata stores. This command is idempotent.
    Init {
        /// Directory to create the repository in.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Index a file or directory tree.
    ///
    /// Walks the tree, skips files whose size, mtime, and content hash are
    /// unchanged since the last run, and extracts, chunks, and embeds the
    /// rest. Files deleted from disk are removed from the index.
    Index {
        /// File or directory to index.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Reindex every file regardless of change detection.
        #[arg(long)]
        force: bool,

        /// Comma-separated extension filter for this run (e.g. `.md,.txt`).
        #[arg(long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,

        /// Progress output: `auto`, `off`, `human`, or `json`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Search indexed chunks.
    ///
    /// Embeds the query with the configured provider and ranks every indexed
    /// chunk by cosine similarity.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Emit results as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show repository status.
    ///
    /// Prints file and chunk counts, vector storage size, and the recorded
    /// embedding model identity.
    Status,

    /// List tracked files.
    List {
        /// Only show files with this extension (e.g. `.md`).
        #[arg(long)]
        extension: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init { path } => {
            let repo = Repository::init(&path)?;
            repo.open_database().await?.close().await;
            println!("Repository created at {}", repo.repo_dir().display());
        }
        Commands::Index {
            path,
            force,
            extensions,
            progress,
        } => {
            let repo = Repository::open(&path)?;
            let provider = create_provider(&cfg.embedding)?;
            let indexer = Indexer::open(repo, &cfg, provider).await?;

            let mode = match progress.as_str() {
                "auto" => ProgressMode::default_for_tty(),
                "off" => ProgressMode::Off,
                "human" => ProgressMode::Human,
                "json" => ProgressMode::Json,
                other => anyhow::bail!("Unknown progress mode: '{}'", other),
            };

            let options = IndexOptions { force, extensions };
            let report = indexer
                .index_path(&path, &options, mode.reporter().as_ref())
                .await?;

            println!(
                "Indexed {} file(s), skipped {}, {} failed ({:.1}s)",
                report.indexed,
                report.skipped,
                report.failed,
                report.elapsed.as_secs_f64()
            );
            for error in &report.errors {
                eprintln!("  error: {}", error);
            }
        }
        Commands::Search { query, top_k, json } => {
            let repo = Repository::open(&std::env::current_dir()?)?;
            let provider = create_provider(&cfg.embedding)?;
            let indexer = Indexer::open(repo, &cfg, provider).await?;

            let hits = indexer.search(&query, top_k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} #{}",
                        i + 1,
                        hit.score,
                        hit.path,
                        hit.chunk_index
                    );
                    println!("   {}", snippet(&hit.text, 160));
                }
            }
        }
        Commands::Status => {
            let repo = Repository::open(&std::env::current_dir()?)?;
            let provider = create_provider(&cfg.embedding)?;
            let indexer = Indexer::open(repo, &cfg, provider).await?;
            stats::print_status(&indexer.status().await?);
        }
        Commands::List { extension } => {
            let repo = Repository::open(&std::env::current_dir()?)?;
            let provider = create_provider(&cfg.embedding)?;
            let indexer = Indexer::open(repo, &cfg, provider).await?;
            stats::print_list(&indexer.list(extension.as_deref()).await?);
        }
    }

    Ok(())
}

/// First `max` characters of a chunk, flattened to one line.
fn snippet(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let truncated: String = flat.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
