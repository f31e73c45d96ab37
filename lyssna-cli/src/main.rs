//! ## lyssna-cli
//! **Operational interface for the passive measurement analyzer**
//!
//! Ingests the JSON event stream produced by remote probe instances and
//! correlates it into a local connection table. Intended for replaying
//! captured event logs and for development against a probe feed piped in on
//! stdin; the production transport lives elsewhere.

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
