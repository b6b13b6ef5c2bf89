//! On-disk layout of a test network
//!
//! Materializes `<nodes_dir>/<node>/NanoTest` for every node, the per-node
//! config files, and the orchestration manifest the controller runs against.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{NetworkConfig, NodeConfig};
use crate::error::Result;

/// Peering port inside every node container
pub const PEERING_PORT: u16 = 17075;

/// Collaborator producing the manifest and per-node config tree
#[async_trait]
pub trait NetworkLayout: Send + Sync {
    /// Write everything needed to bring the network up; returns the enabled services
    async fn materialize(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct ComposeFile {
    version: String,
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Serialize)]
struct ComposeService {
    image: String,
    container_name: String,
    command: String,
    ports: Vec<String>,
    volumes: Vec<String>,
    restart: String,
}

#[derive(Debug, Serialize)]
struct NodeToml {
    node: NodeSection,
    rpc: RpcSection,
}

#[derive(Debug, Serialize)]
struct NodeSection {
    preconfigured_peers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RpcSection {
    enable: bool,
}

#[derive(Debug, Serialize)]
struct RpcToml {
    address: String,
    enable_control: bool,
}

/// Filesystem implementation of [`NetworkLayout`]
pub struct FsLayout {
    config: Arc<NetworkConfig>,
}

impl FsLayout {
    pub fn new(config: Arc<NetworkConfig>) -> Self {
        Self { config }
    }

    fn peers(&self, node: &NodeConfig) -> Vec<String> {
        self.config
            .nodes
            .iter()
            .filter(|n| n.name != node.name)
            .map(|n| format!("{}:{}", n.name, PEERING_PORT))
            .collect()
    }

    fn compose_service(&self, node: &NodeConfig) -> ComposeService {
        let port = node.host_rpc_port().unwrap_or(node.rpc_port);
        ComposeService {
            image: node.image.clone(),
            container_name: node.name.to_string(),
            command: "nano_node daemon --network=test -l".to_string(),
            ports: vec![format!("{}:{}", port, node.rpc_port)],
            volumes: vec![format!("./{}:/root", node.name)],
            restart: "unless-stopped".to_string(),
        }
    }

    async fn write_node_files(&self, node: &NodeConfig) -> Result<()> {
        let data_dir = self.config.node_data_dir(&node.name);
        tokio::fs::create_dir_all(&data_dir).await?;

        let node_toml = NodeToml {
            node: NodeSection {
                preconfigured_peers: self.peers(node),
            },
            rpc: RpcSection { enable: true },
        };
        tokio::fs::write(data_dir.join("config-node.toml"), toml::to_string(&node_toml)?).await?;

        let rpc_toml = RpcToml {
            address: "::ffff:0.0.0.0".to_string(),
            enable_control: true,
        };
        tokio::fs::write(data_dir.join("config-rpc.toml"), toml::to_string(&rpc_toml)?).await?;
        Ok(())
    }
}

#[async_trait]
impl NetworkLayout for FsLayout {
    async fn materialize(&self) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(&self.config.nodes_dir).await?;

        let mut services = BTreeMap::new();
        for node in &self.config.nodes {
            self.write_node_files(node).await?;
            services.insert(node.name.to_string(), self.compose_service(node));
        }

        let manifest = ComposeFile {
            version: "3".to_string(),
            services,
        };
        let manifest_path = self.config.manifest_path();
        if let Some(parent) = manifest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&manifest_path, serde_yaml::to_string(&manifest)?).await?;

        info!("Compose file created at {}", manifest_path.display());
        Ok(self.config.node_ids().into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> Arc<NetworkConfig> {
        let text = format!(
            r#"
nodes_dir = "{}"

[[nodes]]
name = "Genesis"
rpc_url = "http://127.0.0.1:45000"

[[nodes]]
name = "pr1"
rpc_url = "http://127.0.0.1:45001"
"#,
            dir.join("nano_nodes").display()
        );
        Arc::new(NetworkConfig::from_toml(&text).unwrap())
    }

    #[tokio::test]
    async fn test_materialize_writes_tree_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let services = FsLayout::new(config.clone()).materialize().await.unwrap();
        assert_eq!(services, vec!["genesis", "pr1"]);

        let node_toml = std::fs::read_to_string(
            config.nodes_dir.join("pr1/NanoTest/config-node.toml"),
        )
        .unwrap();
        assert!(node_toml.contains("genesis:17075"));
        assert!(!node_toml.contains("pr1:17075"));
        assert!(config.nodes_dir.join("genesis/NanoTest/config-rpc.toml").exists());

        let manifest = std::fs::read_to_string(config.manifest_path()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&manifest).unwrap();
        assert_eq!(
            parsed["services"]["pr1"]["ports"][0].as_str(),
            Some("45001:17076")
        );
        assert_eq!(
            parsed["services"]["genesis"]["container_name"].as_str(),
            Some("genesis")
        );
    }
}
