//! prodsearch CLI - Semantic product search from the terminal
//!
//! Embeds a free-text query, runs a kNN search against the product index and
//! prints the distinct products that match.
//!
//! # Usage
//!
//! ```bash
//! # Search the catalog
//! prodsearch search "blue running shoes"
//!
//! # Ask for more results, as JSON
//! prodsearch search "red summer dress" -n 25 -o json
//!
//! # Check that the index and embedding model are reachable
//! prodsearch status
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use prodsearch_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// prodsearch - Semantic search over a product catalog
#[derive(Parser, Debug)]
#[command(name = "prodsearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "PRODSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Vector index URL
    #[arg(long, global = true, env = "PRODSEARCH_INDEX_URL")]
    index_url: Option<String>,

    /// Vector index backend (elasticsearch, qdrant)
    #[arg(long, global = true, env = "PRODSEARCH_INDEX_BACKEND", value_parser = parse_index_backend)]
    index_backend: Option<prodsearch_config::IndexBackendType>,

    /// Embedding provider type (local, openai)
    #[arg(long, global = true, env = "PRODSEARCH_EMBEDDING_PROVIDER", value_parser = parse_embedding_provider)]
    embedding_provider: Option<prodsearch_config::EmbeddingProviderType>,
}

/// Parse index backend from string
fn parse_index_backend(s: &str) -> Result<prodsearch_config::IndexBackendType, String> {
    s.parse()
        .map_err(|e: prodsearch_config::ConfigError| e.to_string())
}

/// Parse embedding provider from string
fn parse_embedding_provider(s: &str) -> Result<prodsearch_config::EmbeddingProviderType, String> {
    s.parse()
        .map_err(|e: prodsearch_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> prodsearch_config::ConfigOverrides {
        prodsearch_config::ConfigOverrides {
            index_url: self.index_url.clone(),
            index_backend: self.index_backend,
            embedding_provider: self.embedding_provider,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the product catalog
    Search(commands::search::SearchArgs),

    /// Check the vector index and embedding provider
    Status(commands::status::StatusArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show tips for writing good search queries
    Tips,
}

/// Install the global tracing subscriber.
///
/// `--quiet` and `--verbose` win over `RUST_LOG`, which wins over the
/// `[logging]` config section.
fn init_tracing(global: &GlobalOptions, logging: &LoggingConfig) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new("error")
    } else if global.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(true).finish())?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file is reported by the command itself
    let logging = commands::load_config(&cli.global)
        .map(|config| config.logging)
        .unwrap_or_default();
    init_tracing(&cli.global, &logging)?;

    match cli.command {
        Commands::Search(args) => commands::search::execute(args, cli.global).await,
        Commands::Status(args) => commands::status::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
        Commands::Tips => commands::tips::execute(cli.global),
    }
}
