//! Network status aggregation
//!
//! Checks which declared nodes have a running container, queries block
//! counts and versions for those nodes only, and renders one line per
//! declared node in declaration order.

use nanomock_common::rpc::{NodeRpc, VersionInfo};
use nanomock_common::{NetworkConfig, NodeId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::errors::Result;
use crate::executor::{Invocation, ProcessExecutor};

/// Per-node numbers for one status request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeMetrics {
    pub node_id: NodeId,
    pub block_count: u64,
    pub cemented_count: u64,
    pub version: VersionInfo,
}

/// Rendered status: summary line plus one line per declared node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub summary: String,
    pub lines: Vec<String>,
    pub online: usize,
    pub total: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)?;
        if !self.lines.is_empty() {
            write!(f, "\n{}", self.lines.join("\n"))?;
        }
        Ok(())
    }
}

/// `floor(cemented / max_count * 10000) / 100`, truncated to two decimals
pub fn sync_percentage(cemented: u64, max_count: u64) -> f64 {
    if max_count == 0 {
        return 0.0;
    }
    let basis_points = (cemented as u128 * 10_000) / max_count as u128;
    basis_points as f64 / 100.0
}

pub fn summary_line(online: usize, total: usize) -> String {
    if online == total {
        format!("All {} containers online", online)
    } else {
        format!("{}/{} containers online", online, total)
    }
}

fn format_line(metrics: &NodeMetrics, max_count: u64) -> String {
    let version = format!("{} {}", metrics.version.node_vendor, metrics.version.version_tag());
    format!(
        "{:<16} {:<20} {:>6.2}% synced | {}/{} blocks cemented",
        metrics.node_id.as_str(),
        version,
        sync_percentage(metrics.cemented_count, max_count),
        metrics.cemented_count,
        metrics.block_count
    )
}

/// Container name is the node id itself, or compose's generated
/// `<project>_<node>_<n>` / `<project>-<node>-<n>`
pub fn container_matches(name: &str, project: &str, node: &NodeId) -> bool {
    if name == node.as_str() {
        return true;
    }

    ['_', '-'].iter().any(|sep| {
        name.strip_prefix(project)
            .and_then(|rest| rest.strip_prefix(*sep))
            .and_then(|rest| rest.strip_prefix(node.as_str()))
            .and_then(|rest| rest.strip_prefix(*sep))
            .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Build the report from already-collected data
pub fn render(nodes: &[NodeId], online: usize, metrics: &[NodeMetrics]) -> StatusReport {
    let summary = summary_line(online, nodes.len());

    let Some(max_count) = metrics.iter().map(|m| m.block_count).max() else {
        return StatusReport {
            summary,
            lines: Vec::new(),
            online,
            total: nodes.len(),
        };
    };

    let lines = nodes
        .iter()
        .map(|node| match metrics.iter().find(|m| &m.node_id == node) {
            Some(m) => format_line(m, max_count),
            None => format!("{} [down]", node),
        })
        .collect();

    StatusReport {
        summary,
        lines,
        online,
        total: nodes.len(),
    }
}

pub struct StatusAggregator {
    config: Arc<NetworkConfig>,
    rpc: Arc<dyn NodeRpc>,
}

impl StatusAggregator {
    pub fn new(config: Arc<NetworkConfig>, rpc: Arc<dyn NodeRpc>) -> Self {
        Self { config, rpc }
    }

    /// Declared nodes that have a running container, in the given order
    pub async fn online_containers(
        &self,
        executor: &ProcessExecutor,
        nodes: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        let invocation = Invocation::new(
            self.config.container_command.as_str(),
            ["ps", "--format", "{{.Names}}"],
        );
        let result = executor.execute(&invocation).await?;

        let running: Vec<&str> = result.stdout.lines().map(str::trim).collect();
        let project = self.config.project_name.as_str();
        Ok(nodes
            .iter()
            .filter(|node| running.iter().any(|name| container_matches(name, project, node)))
            .cloned()
            .collect())
    }

    /// Block counts and versions, queried one node at a time
    pub async fn collect_metrics(&self, nodes: &[NodeId]) -> Vec<NodeMetrics> {
        let mut metrics = Vec::with_capacity(nodes.len());

        for node in nodes {
            match self.node_metrics(node).await {
                Ok(m) => metrics.push(m),
                Err(e) => warn!("{}: container up but RPC failed: {}", node, e),
            }
        }
        metrics
    }

    async fn node_metrics(&self, node: &NodeId) -> Result<NodeMetrics> {
        let endpoint = self.config.endpoint(node)?;
        let block_count = self
            .rpc
            .block_count(&endpoint, self.config.rpc.max_retries)
            .await?;
        let version = self.rpc.version(&endpoint).await?;

        Ok(NodeMetrics {
            node_id: node.clone(),
            block_count: block_count.count,
            cemented_count: block_count.cemented,
            version,
        })
    }

    /// Full status for `nodes`; an empty slice yields an empty report
    pub async fn report(
        &self,
        executor: &ProcessExecutor,
        nodes: &[NodeId],
    ) -> Result<StatusReport> {
        if nodes.is_empty() {
            return Ok(StatusReport::default());
        }

        let online = self.online_containers(executor, nodes).await?;
        let metrics = self.collect_metrics(&online).await;
        Ok(render(nodes, online.len(), &metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeRunner;
    use crate::healer::AutoHealer;
    use nanomock_common::fakes::{FakeNode, FakeRpc};
    use std::time::Duration;

    fn metrics(id: &str, count: u64, cemented: u64) -> NodeMetrics {
        NodeMetrics {
            node_id: NodeId::new(id),
            block_count: count,
            cemented_count: cemented,
            version: VersionInfo {
                node_vendor: "Nano V25.1".to_string(),
                build_info: "7f7b6f2 \"GNU C++\"".to_string(),
            },
        }
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(n)).collect()
    }

    #[test]
    fn test_sync_percentage_truncates() {
        assert_eq!(sync_percentage(40, 100), 40.0);
        assert_eq!(sync_percentage(100, 100), 100.0);
        assert_eq!(format!("{:.2}", sync_percentage(33, 100)), "33.00");
        // 2/3 = 66.666..% truncates to 66.66, not 66.67
        assert_eq!(format!("{:.2}", sync_percentage(2, 3)), "66.66");
        assert_eq!(sync_percentage(5, 0), 0.0);
    }

    #[test]
    fn test_container_matches() {
        let node = NodeId::new("pr1");
        assert!(container_matches("pr1", "devnet", &node));
        assert!(container_matches("devnet_pr1_1", "devnet", &node));
        assert!(container_matches("devnet-pr1-2", "devnet", &node));
        assert!(!container_matches("devnet_pr10_1", "devnet", &node));
        assert!(!container_matches("other_pr1_1", "devnet", &node));
        assert!(!container_matches("xpr1", "devnet", &node));
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line(3, 3), "All 3 containers online");
        assert_eq!(summary_line(2, 3), "2/3 containers online");
    }

    #[test]
    fn test_render_percentages_against_max_count() {
        let report = render(
            &ids(&["a", "b", "c"]),
            3,
            &[metrics("a", 100, 40), metrics("b", 100, 100), metrics("c", 99, 33)],
        );

        assert!(report.lines[0].contains(" 40.00% synced | 40/100 blocks cemented"));
        assert!(report.lines[1].contains("100.00% synced | 100/100 blocks cemented"));
        assert!(report.lines[2].contains(" 33.00% synced | 33/99 blocks cemented"));
        assert!(report.lines[0].starts_with("a "));
        assert!(report.lines[0].contains("Nano V25.1 7f7b6f2"));
    }

    #[test]
    fn test_render_keeps_declared_order_and_marks_down() {
        // Metrics arrive in a different order than declared
        let arrived = [metrics("c", 10, 10), metrics("a", 10, 5)];
        let report = render(&ids(&["a", "b", "c"]), 2, &arrived);

        assert_eq!(report.lines.len(), 3);
        assert!(report.lines[0].starts_with("a "));
        assert_eq!(report.lines[1], "b [down]");
        assert!(report.lines[2].starts_with("c "));
        assert_eq!(report.summary, "2/3 containers online");
    }

    #[test]
    fn test_render_without_metrics_has_summary_only() {
        let report = render(&ids(&["a"]), 0, &[]);
        assert!(report.lines.is_empty());
        assert_eq!(report.to_string(), "0/1 containers online");
    }

    const CONFIG: &str = r#"
project_name = "devnet"

[[nodes]]
name = "a"
rpc_url = "http://a"

[[nodes]]
name = "b"
rpc_url = "http://b"

[[nodes]]
name = "c"
rpc_url = "http://c"
"#;

    fn setup(ps_output: &str, rpc: FakeRpc) -> (StatusAggregator, ProcessExecutor, Arc<FakeRpc>) {
        let config = Arc::new(NetworkConfig::from_toml(CONFIG).unwrap());
        let runner = Arc::new(FakeRunner::new());
        runner.respond("docker ps", 0, ps_output, "");
        let executor = ProcessExecutor::new(runner, AutoHealer::new("docker", Duration::ZERO));
        let rpc = Arc::new(rpc);
        (StatusAggregator::new(config, rpc.clone()), executor, rpc)
    }

    #[tokio::test]
    async fn test_down_nodes_are_never_queried() {
        let (aggregator, executor, rpc) = setup(
            "devnet_a_1\nc\n",
            FakeRpc::new()
                .with_node("http://a", FakeNode::synced(100, 40))
                .with_node("http://b", FakeNode::synced(100, 100))
                .with_node("http://c", FakeNode::synced(100, 100)),
        );

        let report = aggregator.report(&executor, &ids(&["a", "b", "c"])).await.unwrap();

        assert_eq!(report.summary, "2/3 containers online");
        assert_eq!(report.lines[1], "b [down]");
        assert!(report.lines[0].contains("40.00% synced"));
        assert!(rpc.calls().iter().all(|c| c.url != "http://b"));
    }

    #[tokio::test]
    async fn test_all_online() {
        let (aggregator, executor, _) = setup(
            "a\nb\nc\n",
            FakeRpc::new()
                .with_node("http://a", FakeNode::synced(10, 10))
                .with_node("http://b", FakeNode::synced(10, 10))
                .with_node("http://c", FakeNode::synced(10, 10)),
        );

        let report = aggregator.report(&executor, &ids(&["a", "b", "c"])).await.unwrap();
        assert_eq!(report.summary, "All 3 containers online");
        assert_eq!(report.online, 3);
    }

    #[tokio::test]
    async fn test_nothing_online_yields_empty_body() {
        let (aggregator, executor, rpc) = setup("", FakeRpc::new());

        let report = aggregator.report(&executor, &ids(&["a", "b", "c"])).await.unwrap();
        assert_eq!(report.to_string(), "0/3 containers online");
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_is_noop() {
        let (aggregator, executor, rpc) = setup("a\n", FakeRpc::new());

        let report = aggregator.report(&executor, &[]).await.unwrap();
        assert_eq!(report, StatusReport::default());
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rpc_failure_on_running_container_renders_down() {
        let (aggregator, executor, _) = setup(
            "a\nb\n",
            FakeRpc::new()
                .with_node("http://a", FakeNode::synced(10, 10))
                .with_node("http://b", FakeNode::down()),
        );

        let report = aggregator.report(&executor, &ids(&["a", "b"])).await.unwrap();
        assert_eq!(report.summary, "All 2 containers online");
        assert_eq!(report.lines[1], "b [down]");
    }
}
