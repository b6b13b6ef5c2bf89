//! Nanomock - local ledger test network controller

use anyhow::{Context, Result};
use clap::Parser;
use nanomock::cli::Cli;
use nanomock::executor::SystemRunner;
use nanomock::logging::LogEntry;
use nanomock::Controller;
use nanomock_common::bootstrap::RpcBootstrap;
use nanomock_common::layout::FsLayout;
use nanomock_common::rpc::HttpNodeRpc;
use nanomock_common::NetworkConfig;
use std::sync::Arc;
use std::time::Instant;

fn build_controller(cli: &Cli) -> Result<Controller> {
    let path = NetworkConfig::discover_path(cli.config.as_deref());
    let config = Arc::new(
        NetworkConfig::load(&path)
            .with_context(|| format!("Failed to load network config {}", path.display()))?,
    );

    let rpc = Arc::new(HttpNodeRpc::new(&config.rpc).context("Failed to build RPC client")?);
    let bootstrap = Arc::new(RpcBootstrap::new(
        rpc.clone(),
        config.genesis().endpoint(),
        config.initial_blocks.clone(),
    ));
    let layout = Arc::new(FsLayout::new(Arc::clone(&config)));

    Ok(Controller::new(
        config,
        Arc::new(SystemRunner),
        rpc,
        bootstrap,
        layout,
    )
    .with_dependency_check())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    nanomock_common::logging::init(cli.verbose);

    let controller = build_controller(&cli)?;

    let started = Instant::now();
    let entry = LogEntry::new(&cli.command, cli.nodes.as_deref().unwrap_or_default());
    let outcome = controller
        .execute(&cli.command, cli.nodes.clone(), cli.payload.clone())
        .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(output) => {
            entry.finish(Ok(()), duration_ms).write();
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            let code = err.code();
            entry.finish(Err(&err), duration_ms).write();
            std::process::exit(code);
        }
    }
}
