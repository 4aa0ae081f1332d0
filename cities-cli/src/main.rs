//! Binary crate for the `cities` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Driving the core stores and printing their state

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

/// Logs go to stderr so they never mix with command output.
/// Set `RUST_LOG` (e.g. `RUST_LOG=cities_core=debug`) to see more.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
