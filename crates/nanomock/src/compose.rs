//! Orchestration client
//!
//! Builds `docker-compose -f <manifest> -p <project> <subcommand> [nodes...]`
//! invocations and runs them through the executor without a shell.

use nanomock_common::{NetworkConfig, NodeId};
use std::sync::Arc;
use tracing::info;

use crate::errors::Result;
use crate::executor::{ExecutionResult, Invocation, ProcessExecutor};

/// Orchestration subcommands the controller issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Up,
    Stop,
    Restart,
    Down,
    Build,
    Pull,
}

impl ComposeAction {
    pub fn tokens(&self) -> &'static [&'static str] {
        match self {
            ComposeAction::Up => &["up", "-d"],
            ComposeAction::Stop => &["stop"],
            ComposeAction::Restart => &["restart"],
            ComposeAction::Down => &["down"],
            ComposeAction::Build => &["build"],
            ComposeAction::Pull => &["pull"],
        }
    }
}

pub struct OrchestrationClient {
    config: Arc<NetworkConfig>,
}

impl OrchestrationClient {
    pub fn new(config: Arc<NetworkConfig>) -> Self {
        Self { config }
    }

    /// Invocation for `action`, scoped to `nodes` or to every service when `None`
    pub fn invocation(&self, action: ComposeAction, nodes: Option<&[NodeId]>) -> Invocation {
        let (program, prefix) = self
            .config
            .compose_command
            .split_first()
            .map(|(p, rest)| (p.clone(), rest.to_vec()))
            .unwrap_or_else(|| ("docker-compose".to_string(), Vec::new()));

        let mut args = prefix;
        args.push("-f".to_string());
        args.push(self.config.manifest_path().display().to_string());
        args.push("-p".to_string());
        args.push(self.config.project_name.clone());
        args.extend(action.tokens().iter().map(|t| t.to_string()));
        if let Some(nodes) = nodes {
            args.extend(nodes.iter().map(|n| n.to_string()));
        }

        Invocation::new(program, args)
    }

    pub async fn run(
        &self,
        executor: &ProcessExecutor,
        action: ComposeAction,
        nodes: Option<&[NodeId]>,
    ) -> Result<ExecutionResult> {
        let invocation = self.invocation(action, nodes);
        let result = executor.execute(&invocation).await?;
        info!("{}", invocation);
        Ok(result)
    }
}
