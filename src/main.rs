//! # Main: CLI Entry Point
//!
//! Routes subcommands to the server and the offline maintenance tools.
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API (and optional static client).
//! - `clear`: wipe the persisted queue, or only its entrants with `--keep-settings`.
//! - `status`: print the persisted queue as JSON.
//!
//! ## Global Options
//!
//! - `--config`: TOML settings file (see `tourline::config`).
//! - `--database-url` / `DATABASE_URL`: persist to PostgreSQL.
//! - `--state-file` / `TOURLINE_STATE_FILE`: persist to a JSON snapshot file.
//!
//! With neither storage option the queue lives in memory only.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "tourline", about = "Run a live-event tour queue", version)]
struct Cli {
    /// TOML settings file
    #[arg(long, env = "TOURLINE_CONFIG")]
    config: Option<PathBuf>,

    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JSON snapshot file for the queue (ignored when a database URL is set)
    #[arg(long, env = "TOURLINE_STATE_FILE")]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the queue API
    Serve {
        /// Listen port (default 5000)
        #[arg(long)]
        port: Option<u16>,
        /// Directory with the presentation client, served as fallback
        #[arg(long)]
        static_dir: Option<PathBuf>,
        /// Default tour length in seconds, used when no state is persisted yet
        #[arg(long)]
        tour_length: Option<i64>,
        /// Base URL encoded in the registration QR code
        #[arg(long, env = "TOURLINE_PUBLIC_URL")]
        public_url: Option<String>,
    },
    /// Remove the persisted queue
    Clear {
        /// Keep tour length and pause state, remove only entrants
        #[arg(long)]
        keep_settings: bool,
    },
    /// Print the persisted queue
    Status,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Structured logging: LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let settings = cli::resolve_settings(&cli)?;

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.command {
        Commands::Serve { .. } => rt.block_on(cli::run_serve(settings)),
        Commands::Clear { keep_settings } => rt.block_on(cli::run_clear(settings, *keep_settings)),
        Commands::Status => rt.block_on(cli::run_status(settings)),
    }
}
