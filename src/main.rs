//! Vigil - unified CLI entrypoint.
//!
//! Usage:
//!   vigil start --config config/vigil.toml
//!   vigil init --config config/vigil.toml
//!   vigil sweep --endpoint 127.0.0.1:7070 --inactive-minutes 5

use anyhow::Result;
use clap::Parser;
use vigil::cli::commands::{run_init, run_start, run_sweep};
use vigil::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::Init(args) => run_init(args),
        Commands::Sweep(args) => run_sweep(args).await,
    }
}
