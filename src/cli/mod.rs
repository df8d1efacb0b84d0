//! Vigil CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `vigil start` - Start the presence service
//! - `vigil init` - Write a starter configuration file
//! - `vigil sweep` - Trigger an inactivity sweep on a running service

mod args;
pub mod commands;

pub use args::{Cli, Commands, InitArgs, StartArgs, SweepArgs};
