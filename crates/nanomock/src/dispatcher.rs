//! Command dispatcher
//!
//! A command name plus optional `nodes` / `payload` strings are resolved into
//! a typed [`Request`] first. Resolution is the only place inputs are
//! checked, so a rejected command never reaches the executor or a node.
//! The [`Controller`] then matches the request and composes the orchestration
//! client, poller, aggregator and collaborators.

use nanomock_common::bootstrap::{LedgerBootstrap, WalletIdentity};
use nanomock_common::layout::NetworkLayout;
use nanomock_common::rpc::NodeRpc;
use nanomock_common::{NetworkConfig, NodeId};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::compose::{ComposeAction, OrchestrationClient};
use crate::errors::{ControllerError, Result};
use crate::executor::{check_dependencies, CommandRunner, Invocation, ProcessExecutor};
use crate::healer::AutoHealer;
use crate::readiness::ReadinessPoller;
use crate::status::StatusAggregator;

/// Deletes ledger database files below the working directory
const LEDGER_CLEANUP: &str = "find . -name '*.ldb' -type f -delete";

/// Registered command names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Create,
    Start,
    Stop,
    Restart,
    Status,
    Reset,
    Init,
    Remove,
    Destroy,
    Rpc,
    Build,
    Update,
}

impl CommandName {
    pub const ALL: [CommandName; 12] = [
        CommandName::Create,
        CommandName::Start,
        CommandName::Stop,
        CommandName::Restart,
        CommandName::Status,
        CommandName::Reset,
        CommandName::Init,
        CommandName::Remove,
        CommandName::Destroy,
        CommandName::Rpc,
        CommandName::Build,
        CommandName::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Create => "create",
            CommandName::Start => "start",
            CommandName::Stop => "stop",
            CommandName::Restart => "restart",
            CommandName::Status => "status",
            CommandName::Reset => "reset",
            CommandName::Init => "init",
            CommandName::Remove => "remove",
            CommandName::Destroy => "destroy",
            CommandName::Rpc => "rpc",
            CommandName::Build => "build",
            CommandName::Update => "update",
        }
    }

    pub fn accepts_nodes(&self) -> bool {
        matches!(
            self,
            CommandName::Start
                | CommandName::Stop
                | CommandName::Restart
                | CommandName::Reset
                | CommandName::Rpc
        )
    }

    pub fn accepts_payload(&self) -> bool {
        matches!(self, CommandName::Rpc)
    }

    /// Whether the command drives the orchestration tool or container runtime
    pub fn uses_containers(&self) -> bool {
        !matches!(self, CommandName::Create | CommandName::Init | CommandName::Rpc)
    }
}

impl FromStr for CommandName {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "down" => Ok(CommandName::Remove),
            name => CommandName::ALL
                .iter()
                .find(|c| c.as_str() == name)
                .copied()
                .ok_or_else(|| ControllerError::InvalidCommand(s.to_string())),
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved command. `nodes: None` targets every declared node.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Create,
    Start { nodes: Option<Vec<NodeId>> },
    Stop { nodes: Option<Vec<NodeId>> },
    Restart { nodes: Option<Vec<NodeId>> },
    Status,
    Reset { nodes: Option<Vec<NodeId>> },
    Init,
    Remove,
    Destroy,
    Rpc { nodes: Option<Vec<NodeId>>, payload: Value },
    Build,
    Update,
}

impl Request {
    /// Validate raw inputs against the declared network.
    ///
    /// Inputs a command does not take are dropped. Node names are lowercased
    /// and must be declared; an empty list means every node.
    pub fn resolve(
        config: &NetworkConfig,
        command: &str,
        nodes: Option<Vec<String>>,
        payload: Option<String>,
    ) -> Result<Self> {
        let name: CommandName = command.parse()?;

        let nodes = if name.accepts_nodes() {
            resolve_nodes(config, nodes)?
        } else {
            if nodes.is_some() {
                debug!("{} takes no nodes, ignoring selection", name);
            }
            None
        };

        if !name.accepts_payload() && payload.is_some() {
            debug!("{} takes no payload, ignoring it", name);
        }

        let request = match name {
            CommandName::Create => Request::Create,
            CommandName::Start => Request::Start { nodes },
            CommandName::Stop => Request::Stop { nodes },
            CommandName::Restart => Request::Restart { nodes },
            CommandName::Status => Request::Status,
            CommandName::Reset => Request::Reset { nodes },
            CommandName::Init => Request::Init,
            CommandName::Remove => Request::Remove,
            CommandName::Destroy => Request::Destroy,
            CommandName::Rpc => Request::Rpc {
                nodes,
                payload: parse_payload(payload)?,
            },
            CommandName::Build => Request::Build,
            CommandName::Update => Request::Update,
        };
        Ok(request)
    }

    pub fn name(&self) -> CommandName {
        match self {
            Request::Create => CommandName::Create,
            Request::Start { .. } => CommandName::Start,
            Request::Stop { .. } => CommandName::Stop,
            Request::Restart { .. } => CommandName::Restart,
            Request::Status => CommandName::Status,
            Request::Reset { .. } => CommandName::Reset,
            Request::Init => CommandName::Init,
            Request::Remove => CommandName::Remove,
            Request::Destroy => CommandName::Destroy,
            Request::Rpc { .. } => CommandName::Rpc,
            Request::Build => CommandName::Build,
            Request::Update => CommandName::Update,
        }
    }
}

fn resolve_nodes(
    config: &NetworkConfig,
    nodes: Option<Vec<String>>,
) -> Result<Option<Vec<NodeId>>> {
    let Some(names) = nodes else {
        return Ok(None);
    };

    let ids: Vec<NodeId> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(NodeId::new)
        .collect();
    if ids.is_empty() {
        return Ok(None);
    }

    let unknown: Vec<&str> = ids
        .iter()
        .filter(|id| !config.contains(id))
        .map(NodeId::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(ControllerError::Validation(format!(
            "Unknown nodes: {} (declared: {})",
            unknown.join(", "),
            config
                .node_ids()
                .iter()
                .map(NodeId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok(Some(ids))
}

fn parse_payload(payload: Option<String>) -> Result<Value> {
    let Some(raw) = payload else {
        return Err(ControllerError::Validation(
            "Missing payload for rpc command".to_string(),
        ));
    };

    serde_json::from_str(&raw)
        .map_err(|e| ControllerError::Validation(format!("Payload is not valid JSON: {}", e)))
}

fn describe(nodes: Option<&[NodeId]>) -> String {
    match nodes {
        Some(nodes) => nodes.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", "),
        None => "all nodes".to_string(),
    }
}

/// Single entry point for every network operation
pub struct Controller {
    config: Arc<NetworkConfig>,
    executor: ProcessExecutor,
    compose: OrchestrationClient,
    poller: ReadinessPoller,
    status: StatusAggregator,
    rpc: Arc<dyn NodeRpc>,
    bootstrap: Arc<dyn LedgerBootstrap>,
    layout: Arc<dyn NetworkLayout>,
    check_binaries: bool,
}

impl Controller {
    pub fn new(
        config: Arc<NetworkConfig>,
        runner: Arc<dyn CommandRunner>,
        rpc: Arc<dyn NodeRpc>,
        bootstrap: Arc<dyn LedgerBootstrap>,
        layout: Arc<dyn NetworkLayout>,
    ) -> Self {
        let healer = AutoHealer::new(config.container_command.as_str(), config.healing.settle());

        Self {
            executor: ProcessExecutor::new(runner, healer),
            compose: OrchestrationClient::new(Arc::clone(&config)),
            poller: ReadinessPoller::new(Arc::clone(&config), Arc::clone(&rpc)),
            status: StatusAggregator::new(Arc::clone(&config), Arc::clone(&rpc)),
            config,
            rpc,
            bootstrap,
            layout,
            check_binaries: false,
        }
    }

    /// Check that the orchestration tool and container runtime are on `PATH`
    /// before running commands that need them
    pub fn with_dependency_check(mut self) -> Self {
        self.check_binaries = true;
        self
    }

    /// Resolve and run one command, returning its printable result
    pub async fn execute(
        &self,
        command: &str,
        nodes: Option<Vec<String>>,
        payload: Option<String>,
    ) -> Result<String> {
        let request = Request::resolve(&self.config, command, nodes, payload)?;
        let name = request.name();

        if self.check_binaries && name.uses_containers() {
            let compose = self.config.compose_command.first().map(String::as_str);
            let programs: Vec<&str> = compose
                .into_iter()
                .chain([self.config.container_command.as_str()])
                .collect();
            check_dependencies(&programs)?;
        }

        let output = self.dispatch(request).await?;
        info!("{} completed", name);
        Ok(output)
    }

    pub async fn dispatch(&self, request: Request) -> Result<String> {
        match request {
            Request::Create => self.create().await,
            Request::Start { nodes } => self.start(nodes.as_deref()).await,
            Request::Stop { nodes } => {
                self.compose_run(ComposeAction::Stop, nodes.as_deref()).await?;
                Ok(format!("Stopped {}", describe(nodes.as_deref())))
            }
            Request::Restart { nodes } => {
                self.compose_run(ComposeAction::Restart, nodes.as_deref()).await?;
                Ok(format!("Restarted {}", describe(nodes.as_deref())))
            }
            Request::Status => {
                let report = self.status.report(&self.executor, &self.config.node_ids()).await?;
                Ok(report.to_string())
            }
            Request::Reset { nodes } => self.reset(nodes.as_deref()).await,
            Request::Init => self.init().await,
            Request::Remove => {
                self.compose_run(ComposeAction::Down, None).await?;
                Ok("Removed containers and networks".to_string())
            }
            Request::Destroy => self.destroy().await,
            Request::Rpc { nodes, payload } => self.rpc(nodes.as_deref(), &payload).await,
            Request::Build => {
                self.compose_run(ComposeAction::Build, None).await?;
                Ok("Built service images".to_string())
            }
            Request::Update => {
                for action in [ComposeAction::Pull, ComposeAction::Down, ComposeAction::Build] {
                    self.compose_run(action, None).await?;
                }
                Ok("Pulled images and rebuilt services".to_string())
            }
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    pub fn status(&self) -> &StatusAggregator {
        &self.status
    }

    async fn compose_run(&self, action: ComposeAction, nodes: Option<&[NodeId]>) -> Result<()> {
        self.compose.run(&self.executor, action, nodes).await?;
        Ok(())
    }

    async fn create(&self) -> Result<String> {
        let services = self.layout.materialize().await?;
        Ok(services.join("\n"))
    }

    async fn start(&self, nodes: Option<&[NodeId]>) -> Result<String> {
        self.compose_run(ComposeAction::Up, nodes).await?;
        let outcome = self.poller.wait_for_ready(nodes, true).await?;

        Ok(format!(
            "Started {} ({} reachable)",
            describe(nodes),
            outcome.ready.len()
        ))
    }

    async fn reset(&self, nodes: Option<&[NodeId]>) -> Result<String> {
        self.compose_run(ComposeAction::Stop, nodes).await?;

        let dirs = match nodes {
            Some(nodes) => nodes.iter().map(|n| self.config.node_dir(n)).collect(),
            None => vec![self.config.nodes_dir.clone()],
        };
        for dir in dirs {
            let cleanup = Invocation::shell(LEDGER_CLEANUP).in_dir(dir);
            self.executor.execute(&cleanup).await?;
        }

        Ok(format!("Reset ledger data for {}", describe(nodes)))
    }

    async fn init(&self) -> Result<String> {
        let genesis = self.config.genesis().name.clone();
        let mut wallets = 0;

        for node in &self.config.nodes {
            let identity = if node.name == genesis {
                node.private_key.clone().map(WalletIdentity::PrivateKey)
            } else {
                node.seed.clone().map(WalletIdentity::Seed)
            };
            let Some(identity) = identity else {
                warn!("{}: no key material configured, skipping wallet", node.name);
                continue;
            };

            self.bootstrap.create_wallet(&node.endpoint(), &identity).await?;
            wallets += 1;
        }

        let blocks = self.bootstrap.publish_initial_blocks().await?;
        Ok(format!("Created {} wallets, published {} blocks", wallets, blocks))
    }

    async fn destroy(&self) -> Result<String> {
        self.compose_run(ComposeAction::Down, None).await?;

        let dir = &self.config.nodes_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} already absent", dir.display())
            }
            Err(e) => return Err(e.into()),
        }

        Ok(format!("Destroyed network data in {}", dir.display()))
    }

    /// Post `payload` to each target in order; responses form a JSON array
    async fn rpc(&self, nodes: Option<&[NodeId]>, payload: &Value) -> Result<String> {
        let targets = match nodes {
            Some(nodes) => nodes.to_vec(),
            None => self.config.node_ids(),
        };

        let mut responses = Vec::with_capacity(targets.len());
        for node in &targets {
            let endpoint = self.config.endpoint(node)?;
            responses.push(self.rpc.post_with_auth(&endpoint, payload).await?);
        }

        Ok(serde_json::to_string_pretty(&Value::Array(responses))?)
    }
}
