//! CLI command implementations.

mod init;
mod start;
mod sweep;

pub use init::run_init;
pub use start::run_start;
pub use sweep::run_sweep;
