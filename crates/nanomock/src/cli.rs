//! CLI - Command-line argument parsing
//!
//! The command is a free-form string so unknown names reach the dispatcher
//! and fail there with the invalid-command exit code.

use clap::Parser;
use std::path::PathBuf;

/// Local multi-node test network controller
#[derive(Parser, Debug)]
#[command(name = "nanomock")]
#[command(about = "Operate a local multi-node ledger test network", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Network config file (overrides $NANOMOCK_CONFIG and ./nanomock.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// create, start, stop, restart, status, reset, init, remove/down, destroy, rpc, build, update
    pub command: String,

    /// Comma-separated node subset, e.g. `genesis,pr1`
    #[arg(long, value_delimiter = ',')]
    pub nodes: Option<Vec<String>>,

    /// JSON payload for `rpc`
    #[arg(long)]
    pub payload: Option<String>,
}
