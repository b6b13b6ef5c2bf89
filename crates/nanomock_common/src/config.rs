//! Network configuration for nanomock.
//!
//! Loads the test network description from `nanomock.toml` (or the path given
//! by `--config` / `$NANOMOCK_CONFIG`). The result is immutable and shared via
//! `Arc` by every component; nothing here is mutated after load.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CommonError, Result};

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "nanomock.toml";

/// Environment override for the config file path
pub const CONFIG_ENV: &str = "NANOMOCK_CONFIG";

/// Name of a node within a project.
///
/// The orchestration tool only accepts lowercase service names, so the
/// identifier is lowercased on construction and compared as-is afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RPC endpoint of a node, with optional basic-auth credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl RpcEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// One declared node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: NodeId,

    /// RPC URL reachable from the host, e.g. `http://127.0.0.1:45000`
    pub rpc_url: String,

    #[serde(default)]
    pub rpc_user: Option<String>,

    #[serde(default)]
    pub rpc_password: Option<String>,

    /// Container image for the node service
    #[serde(default = "default_image")]
    pub image: String,

    /// RPC port inside the container
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Wallet seed (non-genesis nodes)
    #[serde(default)]
    pub seed: Option<String>,

    /// Wallet private key (genesis node)
    #[serde(default)]
    pub private_key: Option<String>,

    #[serde(default)]
    pub genesis: bool,
}

impl NodeConfig {
    pub fn endpoint(&self) -> RpcEndpoint {
        RpcEndpoint {
            url: self.rpc_url.clone(),
            username: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
        }
    }

    /// Parsed RPC URL; only http(s) URLs with a host are accepted
    pub fn parsed_rpc_url(&self) -> Result<Url> {
        let url = Url::parse(&self.rpc_url).map_err(|e| {
            CommonError::Config(format!(
                "node '{}': invalid rpc_url '{}': {}",
                self.name, self.rpc_url, e
            ))
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(CommonError::Config(format!(
                "node '{}': rpc_url '{}' must be an http(s) URL with a host",
                self.name, self.rpc_url
            )));
        }
        Ok(url)
    }

    /// Host port of the RPC URL, explicit or the scheme's default
    pub fn host_rpc_port(&self) -> Option<u16> {
        self.parsed_rpc_url().ok()?.port_or_known_default()
    }
}

fn default_image() -> String {
    "nanocurrency/nano-beta:latest".to_string()
}

fn default_rpc_port() -> u16 {
    17076
}

/// Readiness polling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Timeout applied to each individual probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Overall wall-clock deadline across all rounds
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Delay between rounds
    #[serde(default = "default_round_interval")]
    pub round_interval_ms: u64,
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_deadline() -> u64 {
    15
}

fn default_round_interval() -> u64 {
    1000
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            deadline_secs: default_deadline(),
            round_interval_ms: default_round_interval(),
        }
    }
}

impl ReadinessConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }
}

/// Auto-heal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Pause after stopping a conflicting container
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
}

fn default_settle() -> u64 {
    5
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle(),
        }
    }
}

impl HealingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// HTTP client settings for node RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcClientConfig {
    #[serde(default = "default_rpc_timeout")]
    pub timeout_ms: u64,

    /// Retries for ordinary calls; readiness probes always use zero
    #[serde(default = "default_rpc_retries")]
    pub max_retries: u32,

    #[serde(default = "default_rpc_backoff")]
    pub backoff_ms: u64,
}

fn default_rpc_timeout() -> u64 {
    5000
}

fn default_rpc_retries() -> u32 {
    2
}

fn default_rpc_backoff() -> u64 {
    500
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_rpc_timeout(),
            max_retries: default_rpc_retries(),
            backoff_ms: default_rpc_backoff(),
        }
    }
}

/// Full description of one test network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Orchestration project name scoping containers and networks
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Root of the per-node config and data tree
    #[serde(default = "default_nodes_dir")]
    pub nodes_dir: PathBuf,

    /// Orchestration manifest; defaults to `<nodes_dir>/docker-compose.yml`
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    /// Argv prefix of the orchestration tool
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,

    /// Container runtime binary used for presence checks and healing
    #[serde(default = "default_container_command")]
    pub container_command: String,

    /// JSON file with the blocks published by `init`
    #[serde(default)]
    pub initial_blocks: Option<PathBuf>,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub healing: HealingConfig,

    #[serde(default)]
    pub rpc: RpcClientConfig,

    pub nodes: Vec<NodeConfig>,
}

fn default_project_name() -> String {
    "nanomock".to_string()
}

fn default_nodes_dir() -> PathBuf {
    PathBuf::from("nano_nodes")
}

fn default_compose_command() -> Vec<String> {
    vec!["docker-compose".to_string()]
}

fn default_container_command() -> String {
    "docker".to_string()
}

impl NetworkConfig {
    /// Resolve the config path: explicit flag, then `$NANOMOCK_CONFIG`, then the default file
    pub fn discover_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading network config from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            CommonError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::from_toml(&content)?;
        debug!(
            "Loaded {} nodes for project '{}'",
            config.nodes.len(),
            config.project_name
        );
        Ok(config)
    }

    /// Parse and validate config text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: NetworkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(CommonError::Config("no nodes declared".to_string()));
        }

        if self.compose_command.is_empty() {
            return Err(CommonError::Config("compose_command is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.name.as_str().is_empty() {
                return Err(CommonError::Config("node with empty name".to_string()));
            }
            node.parsed_rpc_url()?;
            if !seen.insert(node.name.clone()) {
                return Err(CommonError::Config(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        let genesis_count = self.nodes.iter().filter(|n| n.genesis).count();
        if genesis_count > 1 {
            return Err(CommonError::Config(format!(
                "{} nodes flagged as genesis, expected at most one",
                genesis_count
            )));
        }

        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.nodes_dir.join("docker-compose.yml"))
    }

    /// Declared node identifiers, in declaration order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| &n.name == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn endpoint(&self, id: &NodeId) -> Result<RpcEndpoint> {
        self.node(id)
            .map(NodeConfig::endpoint)
            .ok_or_else(|| CommonError::Config(format!("unknown node '{}'", id)))
    }

    /// The flagged genesis node, or the first declared node
    pub fn genesis(&self) -> &NodeConfig {
        self.nodes
            .iter()
            .find(|n| n.genesis)
            .unwrap_or(&self.nodes[0])
    }

    /// Per-node directory: `<nodes_dir>/<node>`
    pub fn node_dir(&self, id: &NodeId) -> PathBuf {
        self.nodes_dir.join(id.as_str())
    }

    /// Ledger data directory inside a node directory
    pub fn node_data_dir(&self, id: &NodeId) -> PathBuf {
        self.node_dir(id).join("NanoTest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
project_name = "devnet"

[[nodes]]
name = "Genesis"
rpc_url = "http://127.0.0.1:45000"
private_key = "00AA"

[[nodes]]
name = "PR1"
rpc_url = "http://127.0.0.1:45001"
seed = "11BB"
"#;

    #[test]
    fn test_node_id_lowercases() {
        assert_eq!(NodeId::new(" Node_A ").as_str(), "node_a");
        assert_eq!(NodeId::from("PR1"), NodeId::from("pr1"));
    }

    #[test]
    fn test_load_with_defaults() {
        let config = NetworkConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.project_name, "devnet");
        assert_eq!(
            config.node_ids(),
            vec![NodeId::new("genesis"), NodeId::new("pr1")]
        );
        assert_eq!(config.compose_command, vec!["docker-compose"]);
        assert_eq!(config.readiness.probe_timeout_secs, 10);
        assert_eq!(config.readiness.deadline_secs, 15);
        assert_eq!(config.healing.settle_secs, 5);
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("nano_nodes/docker-compose.yml")
        );
    }

    #[test]
    fn test_genesis_falls_back_to_first_node() {
        let config = NetworkConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.genesis().name.as_str(), "genesis");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[nodes]]
name = "a"
rpc_url = "http://127.0.0.1:1"

[[nodes]]
name = "A"
rpc_url = "http://127.0.0.1:2"
"#;
        let err = NetworkConfig::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("duplicate node name 'a'"));
    }

    #[test]
    fn test_empty_node_list_rejected() {
        let err = NetworkConfig::from_toml("nodes = []").unwrap_err();
        assert!(matches!(err, CommonError::Config(_)));
    }

    #[test]
    fn test_node_paths_and_port() {
        let config = NetworkConfig::from_toml(SAMPLE).unwrap();
        let id = NodeId::new("pr1");

        assert_eq!(config.node_dir(&id), PathBuf::from("nano_nodes/pr1"));
        assert_eq!(
            config.node_data_dir(&id),
            PathBuf::from("nano_nodes/pr1/NanoTest")
        );
        assert_eq!(config.node(&id).unwrap().host_rpc_port(), Some(45001));
        assert!(config.endpoint(&NodeId::new("missing")).is_err());
    }

    #[test]
    fn test_invalid_rpc_url_rejected_at_load() {
        for url in ["not a url", "ftp://127.0.0.1:45000", "127.0.0.1:45000"] {
            let text = format!("[[nodes]]\nname = \"a\"\nrpc_url = \"{}\"\n", url);
            let err = NetworkConfig::from_toml(&text).unwrap_err();
            assert!(
                matches!(err, CommonError::Config(ref m) if m.contains("rpc_url")),
                "{url}: {err}"
            );
        }
    }

    #[test]
    fn test_host_port_defaults_to_scheme_port() {
        let text = "[[nodes]]\nname = \"a\"\nrpc_url = \"http://localhost/rpc\"\n";
        let config = NetworkConfig::from_toml(text).unwrap();
        assert_eq!(config.nodes[0].host_rpc_port(), Some(80));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nanomock.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = NetworkConfig::load(&path).unwrap();
        assert_eq!(config.nodes.len(), 2);

        let missing = NetworkConfig::load(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }
}
