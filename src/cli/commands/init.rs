//! Init command - writes a starter configuration file.

use crate::cli::args::InitArgs;
use crate::config::starter_config_toml;
use anyhow::{bail, Context, Result};
use std::fs;

pub fn run_init(args: InitArgs) -> Result<()> {
    if args.config.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.config.display()
        );
    }
    if let Some(parent) = args.config.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
    }
    fs::write(&args.config, starter_config_toml())
        .with_context(|| format!("unable to write {}", args.config.display()))?;
    println!("wrote starter configuration to {}", args.config.display());
    Ok(())
}
