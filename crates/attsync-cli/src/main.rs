//! attsync CLI - Command-line interface for the attachment sync state engine
//!
//! Provides commands for:
//! - Scanning attachment files for local changes
//! - Viewing sync status and transfer queues
//! - Installing staged downloads
//! - Resolving file conflicts
//! - Managing storage modes and configuration

use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result};
use attsync_core::config::{Config, LoggingConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    apply::ApplyCommand, completions::CompletionsCommand, config::ConfigCommand,
    conflicts::ConflictsCommand, downloads::DownloadsCommand, mode::ModeCommand,
    scan::ScanCommand, status::StatusCommand, uploads::UploadsCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "attsync", version, about = "Local attachment sync state engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check attachment files for local changes
    Scan(ScanCommand),
    /// Show sync state counts and library settings
    Status(StatusCommand),
    /// List attachments waiting for download
    Downloads(DownloadsCommand),
    /// List attachments waiting for upload
    Uploads(UploadsCommand),
    /// Install a staged download
    Apply(ApplyCommand),
    /// List and resolve file conflicts
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// Show or change a library's storage and download mode
    #[command(subcommand)]
    Mode(ModeCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Installs the tracing subscriber
///
/// `-v` wins over `RUST_LOG`, which wins over `logging.level`.
fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) -> Result<()> {
    let env_filter = match verbose {
        0 => {
            let fallback = if quiet { "warn" } else { logging.level.as_str() };
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
        }
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let writer = Mutex::new(file);
            if logging.json {
                builder.json().with_writer(writer).init();
            } else {
                builder.with_ansi(false).with_writer(writer).init();
            }
        }
        None if logging.json => builder.json().with_writer(std::io::stderr).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    init_tracing(cli.verbose, cli.quiet, &config.logging)?;

    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    match cli.command {
        Commands::Scan(cmd) => cmd.execute(&config_path, format).await,
        Commands::Status(cmd) => cmd.execute(&config_path, format).await,
        Commands::Downloads(cmd) => cmd.execute(&config_path, format).await,
        Commands::Uploads(cmd) => cmd.execute(&config_path, format).await,
        Commands::Apply(cmd) => cmd.execute(&config_path, format).await,
        Commands::Conflicts(cmd) => cmd.execute(&config_path, format).await,
        Commands::Mode(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
