//! Fake collaborators for deterministic testing
//!
//! `FakeRpc` answers RPC calls from an in-memory table keyed by endpoint URL
//! and records every call, so callers can assert on what was queried.
//! `FakeBootstrap` and `FakeLayout` record their calls and never touch a node
//! or the filesystem.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::bootstrap::{LedgerBootstrap, WalletIdentity};
use crate::config::RpcEndpoint;
use crate::error::{CommonError, Result};
use crate::layout::NetworkLayout;
use crate::rpc::{BlockCount, NodeRpc, VersionInfo};

/// Scripted state of one fake node
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub count: u64,
    pub cemented: u64,
    pub node_vendor: String,
    pub build_info: String,
    /// Number of `block_count` calls that fail before the node answers
    pub failing_probes: u32,
    /// Node never answers
    pub down: bool,
    /// Artificial latency on every call
    pub delay: Duration,
}

impl FakeNode {
    pub fn synced(count: u64, cemented: u64) -> Self {
        Self {
            count,
            cemented,
            node_vendor: "Nano V25.1".to_string(),
            build_info: "7f7b6f2 \"GNU C++ version 11\"".to_string(),
            failing_probes: 0,
            down: false,
            delay: Duration::ZERO,
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::synced(0, 0)
        }
    }

    pub fn failing_first(mut self, probes: u32) -> Self {
        self.failing_probes = probes;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub url: String,
    pub action: String,
    pub max_retries: Option<u32>,
}

#[derive(Default)]
pub struct FakeRpc {
    nodes: Mutex<HashMap<String, FakeNode>>,
    calls: Mutex<Vec<RpcCall>>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, url: &str, node: FakeNode) -> Self {
        self.nodes.lock().unwrap().insert(url.to_string(), node);
        self
    }

    pub fn set_node(&self, url: &str, node: FakeNode) {
        self.nodes.lock().unwrap().insert(url.to_string(), node);
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, action: &str) -> Vec<RpcCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .collect()
    }

    fn record(&self, endpoint: &RpcEndpoint, action: &str, max_retries: Option<u32>) {
        self.calls.lock().unwrap().push(RpcCall {
            url: endpoint.url.clone(),
            action: action.to_string(),
            max_retries,
        });
    }

    /// Look up the node, consuming one scripted failure if any remain
    fn reach(&self, endpoint: &RpcEndpoint, is_probe: bool) -> (Duration, Result<FakeNode>) {
        let mut nodes = self.nodes.lock().unwrap();
        let Some(node) = nodes.get_mut(&endpoint.url) else {
            return (
                Duration::ZERO,
                Err(CommonError::rpc(&endpoint.url, "connection refused")),
            );
        };

        let delay = node.delay;
        if node.down {
            return (delay, Err(CommonError::rpc(&endpoint.url, "connection refused")));
        }
        if is_probe && node.failing_probes > 0 {
            node.failing_probes -= 1;
            return (delay, Err(CommonError::rpc(&endpoint.url, "connection reset")));
        }
        (delay, Ok(node.clone()))
    }
}

#[async_trait]
impl NodeRpc for FakeRpc {
    async fn block_count(&self, endpoint: &RpcEndpoint, max_retries: u32) -> Result<BlockCount> {
        self.record(endpoint, "block_count", Some(max_retries));
        let (delay, node) = self.reach(endpoint, true);
        tokio::time::sleep(delay).await;
        let node = node?;
        Ok(BlockCount {
            count: node.count,
            cemented: node.cemented,
            unchecked: 0,
        })
    }

    async fn version(&self, endpoint: &RpcEndpoint) -> Result<VersionInfo> {
        self.record(endpoint, "version", None);
        let (delay, node) = self.reach(endpoint, false);
        tokio::time::sleep(delay).await;
        let node = node?;
        Ok(VersionInfo {
            node_vendor: node.node_vendor,
            build_info: node.build_info,
        })
    }

    async fn post_with_auth(&self, endpoint: &RpcEndpoint, payload: &Value) -> Result<Value> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        self.record(endpoint, &action, None);
        let (delay, node) = self.reach(endpoint, false);
        tokio::time::sleep(delay).await;
        node?;

        if action == "wallet_create" {
            let n = self.calls_for("wallet_create").len();
            return Ok(json!({ "wallet": format!("wallet-{}", n) }));
        }
        Ok(json!({ "node": endpoint.url, "action": action }))
    }
}

/// Records wallets and publishes without any RPC traffic
#[derive(Default)]
pub struct FakeBootstrap {
    wallets: Mutex<Vec<(String, WalletIdentity)>>,
    blocks: usize,
    published: Mutex<u32>,
}

impl FakeBootstrap {
    pub fn new(blocks: usize) -> Self {
        Self {
            blocks,
            ..Self::default()
        }
    }

    /// `(endpoint url, identity)` per created wallet, in call order
    pub fn wallets(&self) -> Vec<(String, WalletIdentity)> {
        self.wallets.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> u32 {
        *self.published.lock().unwrap()
    }
}

#[async_trait]
impl LedgerBootstrap for FakeBootstrap {
    async fn create_wallet(
        &self,
        endpoint: &RpcEndpoint,
        identity: &WalletIdentity,
    ) -> Result<String> {
        let mut wallets = self.wallets.lock().unwrap();
        wallets.push((endpoint.url.clone(), identity.clone()));
        Ok(format!("wallet-{}", wallets.len()))
    }

    async fn publish_initial_blocks(&self) -> Result<usize> {
        *self.published.lock().unwrap() += 1;
        Ok(self.blocks)
    }
}

/// Returns a fixed service list
#[derive(Default)]
pub struct FakeLayout {
    services: Vec<String>,
    calls: Mutex<u32>,
}

impl FakeLayout {
    pub fn new(services: &[&str]) -> Self {
        Self {
            services: services.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl NetworkLayout for FakeLayout {
    async fn materialize(&self) -> Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.services.clone())
    }
}
