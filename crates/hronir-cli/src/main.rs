//! hronir - canon consensus engine CLI
//!
//! Thin client over `hronir-core` against a local `SQLite` database.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Validation or business-rule failure
//! - 2: Bad command-line arguments (clap's native behavior)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hronir_core::config::EngineConfig;
use hronir_core::engine::ConsensusEngine;
use hronir_core::storage::SqliteStorage;
use tracing_subscriber::EnvFilter;

mod commands;

/// hronir - canon consensus engine
#[derive(Parser, Debug)]
#[command(name = "hronir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the corpus database
    #[arg(long, default_value = "hronir.db")]
    db: PathBuf,

    /// Path to an engine configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Propose and inspect continuation paths
    #[command(subcommand)]
    Path(commands::path::PathCommand),

    /// Start and commit voting sessions
    #[command(subcommand)]
    Session(commands::session::SessionCommand),

    /// Query the canonical chain, rankings, and duels
    #[command(subcommand)]
    Canon(commands::canon::CanonCommand),

    /// Audit the transaction ledger
    #[command(subcommand)]
    Ledger(commands::ledger::LedgerCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let storage = SqliteStorage::open(&cli.db)?;
    let engine = ConsensusEngine::new(storage, config);

    match cli.command {
        Commands::Path(cmd) => commands::path::run(&engine, cmd),
        Commands::Session(cmd) => commands::session::run(&engine, cmd),
        Commands::Canon(cmd) => commands::canon::run(&engine, cmd),
        Commands::Ledger(cmd) => commands::ledger::run(&engine, cmd),
    }
}
