//! Readiness poller
//!
//! Waits for node RPC endpoints to answer after containers come up. Each
//! round probes every still-pending node concurrently (one `block_count` call
//! with no retries, bounded by the per-probe timeout); rounds run one after
//! another until nothing is pending or the overall deadline passes.

use nanomock_common::config::ReadinessConfig;
use nanomock_common::rpc::NodeRpc;
use nanomock_common::{NetworkConfig, NodeId, RpcEndpoint};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{ControllerError, Result};

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub reachable: bool,
}

/// Where polling stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessOutcome {
    pub ready: Vec<NodeId>,
    pub pending: Vec<NodeId>,
    pub rounds: u32,
}

impl ReadinessOutcome {
    pub fn all_ready(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Timing limits for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub probe_timeout: Duration,
    pub deadline: Duration,
    pub round_interval: Duration,
}

impl From<&ReadinessConfig> for PollSettings {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            deadline: config.deadline(),
            round_interval: config.round_interval(),
        }
    }
}

pub struct ReadinessPoller {
    config: Arc<NetworkConfig>,
    rpc: Arc<dyn NodeRpc>,
    settings: PollSettings,
}

impl ReadinessPoller {
    pub fn new(config: Arc<NetworkConfig>, rpc: Arc<dyn NodeRpc>) -> Self {
        let settings = PollSettings::from(&config.readiness);
        Self {
            config,
            rpc,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Poll until every node answers.
    ///
    /// `None` or an empty slice means every declared node. With `wait = false`
    /// exactly one round runs and the outcome is returned as-is.
    pub async fn wait_for_ready(
        &self,
        nodes: Option<&[NodeId]>,
        wait: bool,
    ) -> Result<ReadinessOutcome> {
        let start = Instant::now();

        let nodes: Vec<NodeId> = match nodes {
            Some(nodes) if !nodes.is_empty() => nodes.to_vec(),
            _ => self.config.node_ids(),
        };

        let mut pending = nodes.clone();
        let mut rounds = 0;

        while !pending.is_empty() {
            let reachable: HashSet<NodeId> = self
                .probe_round(&pending)
                .await
                .into_iter()
                .filter(|h| h.reachable)
                .map(|h| h.node_id)
                .collect();
            rounds += 1;

            pending.retain(|n| !reachable.contains(n));
            debug!(
                "Readiness round {}: {} reachable, {} pending",
                rounds,
                reachable.len(),
                pending.len()
            );

            if !wait {
                break;
            }

            if !pending.is_empty() && start.elapsed() > self.settings.deadline {
                return Err(ControllerError::ReachabilityTimeout {
                    nodes: pending.iter().map(NodeId::to_string).collect(),
                });
            }

            if !pending.is_empty() {
                sleep(self.settings.round_interval).await;
            }
        }

        let ready: Vec<NodeId> = nodes.into_iter().filter(|n| !pending.contains(n)).collect();
        if pending.is_empty() {
            info!("Nodes {:?} reachable", ready.iter().map(NodeId::as_str).collect::<Vec<_>>());
        }

        Ok(ReadinessOutcome {
            ready,
            pending,
            rounds,
        })
    }

    /// One probe per node, all in flight at once
    async fn probe_round(&self, nodes: &[NodeId]) -> Vec<NodeHealth> {
        let mut join_set = JoinSet::new();

        for node in nodes {
            let node_id = node.clone();
            let endpoint = self.config.endpoint(node);
            let rpc = Arc::clone(&self.rpc);
            let probe_timeout = self.settings.probe_timeout;

            join_set.spawn(async move {
                let reachable = match endpoint {
                    Ok(endpoint) => probe(rpc.as_ref(), &endpoint, probe_timeout).await,
                    Err(e) => {
                        warn!("{}: {}", node_id, e);
                        false
                    }
                };
                NodeHealth { node_id, reachable }
            });
        }

        let mut results = Vec::with_capacity(nodes.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(health) => results.push(health),
                Err(e) => warn!("Readiness probe task failed: {}", e),
            }
        }
        results
    }
}

/// Reachable iff `block_count` answers within `limit`
async fn probe(rpc: &dyn NodeRpc, endpoint: &RpcEndpoint, limit: Duration) -> bool {
    match timeout(limit, rpc.block_count(endpoint, 0)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("RPC {} not yet reachable: {}", endpoint, e);
            false
        }
        Err(_) => {
            warn!("RPC {} probe timed out after {:?}", endpoint, limit);
            false
        }
    }
}
