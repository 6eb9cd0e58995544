//! bookchat CLI
//!
//! Main entry point for the bookchat command-line tool.
//! Ingests chunked books into a local vector index and retrieves passages.

mod commands;

use bookchat_core::{config::AppConfig, logging, AppResult};
use clap::{Parser, Subcommand};
use commands::{IngestCommand, RetrieveCommand, StatsCommand};
use std::path::PathBuf;

/// bookchat - local book index and retrieval
#[derive(Parser, Debug)]
#[command(name = "bookchat")]
#[command(about = "Index books and retrieve relevant passages", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "BOOKCHAT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "BOOKCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or replace a book's chunks
    Ingest(IngestCommand),

    /// Retrieve the chunks closest to a query
    Retrieve(RetrieveCommand),

    /// Show index statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Workspace and config file decide which YAML is merged, so resolve them first
    let config = AppConfig::load_with(cli.workspace.clone(), cli.config.clone())?.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("bookchat starting");
    tracing::debug!("Workspace: {:?}", config.workspace);

    config.ensure_state_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Retrieve(_) => "retrieve",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Retrieve(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
