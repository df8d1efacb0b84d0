//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Vigil - room presence tracking and disconnect reconciliation.
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Vigil presence service and operator tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the presence service
    Start(StartArgs),

    /// Write a starter configuration file
    Init(InitArgs),

    /// Trigger an inactivity sweep against a running service
    Sweep(SweepArgs),
}

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/vigil.toml")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the starter configuration
    #[arg(short, long, default_value = "config/vigil.toml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Control endpoint of the running service
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    pub endpoint: String,

    /// Inactivity threshold in minutes; omit to use the service default
    #[arg(long)]
    pub inactive_minutes: Option<u64>,
}
