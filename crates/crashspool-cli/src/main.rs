//! Crashspool CLI - command-line interface for the crash report spool
//!
//! Provides commands for:
//! - Listing spooled reports and their lifecycle state
//! - Looking up upload status by local id
//! - Ingesting crash artifacts by hand
//! - Driving one-shot upload scans
//! - Force-uploading reports past the retry gate
//! - Running retention sweeps
//!
//! The CLI operates directly on the spool directory from the shared
//! configuration file; it does not talk to a running daemon.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crashspool_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    force::ForceCommand, ingest::IngestCommand, list::ListCommand, purge::PurgeCommand,
    status::StatusCommand, upload::UploadCommand,
};
use output::{Output, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "crashspool", version, about = "Crash report spool manager")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List reports in the spool
    List(ListCommand),
    /// Show upload status for a report
    Status(StatusCommand),
    /// Copy a crash artifact into the spool
    Ingest(IngestCommand),
    /// Attempt every eligible report now
    Upload(UploadCommand),
    /// Force-upload a report, bypassing the retry gate
    Force(ForceCommand),
    /// Delete stale, uploaded and over-quota reports
    Purge(PurgeCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the CLI quiet unless RUST_LOG says otherwise.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    let out = Output::new(if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    });

    match cli.command {
        Commands::List(cmd) => cmd.execute(&config, &out),
        Commands::Status(cmd) => cmd.execute(&config, &out),
        Commands::Ingest(cmd) => cmd.execute(&config, &out),
        Commands::Upload(cmd) => cmd.execute(&config, &out).await,
        Commands::Force(cmd) => cmd.execute(&config, &out).await,
        Commands::Purge(cmd) => cmd.execute(&config, &out),
    }
}
