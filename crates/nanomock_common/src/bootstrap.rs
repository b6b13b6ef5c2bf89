//! Ledger bootstrap: node wallets and initial blocks

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::RpcEndpoint;
use crate::error::{CommonError, Result};
use crate::rpc::NodeRpc;

/// Key material a node wallet is created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletIdentity {
    PrivateKey(String),
    Seed(String),
}

/// Collaborator that seeds a fresh network with wallets and genesis blocks
#[async_trait]
pub trait LedgerBootstrap: Send + Sync {
    /// Create a wallet on the node and return its wallet id
    async fn create_wallet(
        &self,
        endpoint: &RpcEndpoint,
        identity: &WalletIdentity,
    ) -> Result<String>;

    /// Publish the initial block set; returns the number of blocks processed
    async fn publish_initial_blocks(&self) -> Result<usize>;
}

/// Bootstrap that talks to nodes over their RPC interface
pub struct RpcBootstrap {
    rpc: Arc<dyn NodeRpc>,
    genesis: RpcEndpoint,
    blocks_file: Option<PathBuf>,
}

impl RpcBootstrap {
    pub fn new(rpc: Arc<dyn NodeRpc>, genesis: RpcEndpoint, blocks_file: Option<PathBuf>) -> Self {
        Self {
            rpc,
            genesis,
            blocks_file,
        }
    }

    async fn load_blocks(&self) -> Result<Vec<Value>> {
        let Some(path) = &self.blocks_file else {
            return Ok(Vec::new());
        };

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CommonError::Bootstrap(format!("failed to read {}: {}", path.display(), e))
        })?;

        match serde_json::from_str(&content)? {
            Value::Array(blocks) => Ok(blocks),
            _ => Err(CommonError::Bootstrap(format!(
                "{} must contain a JSON array of blocks",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl LedgerBootstrap for RpcBootstrap {
    async fn create_wallet(
        &self,
        endpoint: &RpcEndpoint,
        identity: &WalletIdentity,
    ) -> Result<String> {
        let created = self
            .rpc
            .post_with_auth(endpoint, &json!({ "action": "wallet_create" }))
            .await?;

        let wallet = created
            .get("wallet")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CommonError::Bootstrap(format!("{}: wallet_create returned no wallet id", endpoint))
            })?
            .to_string();

        let payload = match identity {
            WalletIdentity::PrivateKey(key) => json!({
                "action": "wallet_add",
                "wallet": wallet,
                "key": key,
            }),
            WalletIdentity::Seed(seed) => json!({
                "action": "wallet_change_seed",
                "wallet": wallet,
                "seed": seed,
            }),
        };
        self.rpc.post_with_auth(endpoint, &payload).await?;

        info!("Wallet {} created on {}", wallet, endpoint);
        Ok(wallet)
    }

    async fn publish_initial_blocks(&self) -> Result<usize> {
        let blocks = self.load_blocks().await?;

        for block in &blocks {
            let payload = json!({
                "action": "process",
                "json_block": "true",
                "block": block,
            });
            self.rpc.post_with_auth(&self.genesis, &payload).await?;
        }

        info!("Published {} initial blocks to {}", blocks.len(), self.genesis);
        Ok(blocks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeNode, FakeRpc};

    const GENESIS: &str = "http://127.0.0.1:45000";

    #[tokio::test]
    async fn test_create_wallet_with_seed() {
        let rpc = Arc::new(FakeRpc::new().with_node(GENESIS, FakeNode::synced(1, 1)));
        let bootstrap = RpcBootstrap::new(rpc.clone(), RpcEndpoint::new(GENESIS), None);

        let wallet = bootstrap
            .create_wallet(&RpcEndpoint::new(GENESIS), &WalletIdentity::Seed("AB".into()))
            .await
            .unwrap();

        assert_eq!(wallet, "wallet-1");
        let actions: Vec<_> = rpc.calls().into_iter().map(|c| c.action).collect();
        assert_eq!(actions, vec!["wallet_create", "wallet_change_seed"]);
    }

    #[tokio::test]
    async fn test_create_wallet_on_down_node_fails() {
        let rpc = Arc::new(FakeRpc::new().with_node(GENESIS, FakeNode::down()));
        let bootstrap = RpcBootstrap::new(rpc, RpcEndpoint::new(GENESIS), None);

        let result = bootstrap
            .create_wallet(&RpcEndpoint::new(GENESIS), &WalletIdentity::PrivateKey("00".into()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_blocks_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.json");
        std::fs::write(&path, r#"[{"type":"state"},{"type":"state"},{"type":"state"}]"#).unwrap();

        let rpc = Arc::new(FakeRpc::new().with_node(GENESIS, FakeNode::synced(1, 1)));
        let bootstrap = RpcBootstrap::new(rpc.clone(), RpcEndpoint::new(GENESIS), Some(path));

        assert_eq!(bootstrap.publish_initial_blocks().await.unwrap(), 3);
        assert_eq!(rpc.calls_for("process").len(), 3);
    }

    #[tokio::test]
    async fn test_publish_without_file_is_noop() {
        let rpc = Arc::new(FakeRpc::new());
        let bootstrap = RpcBootstrap::new(rpc.clone(), RpcEndpoint::new(GENESIS), None);

        assert_eq!(bootstrap.publish_initial_blocks().await.unwrap(), 0);
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_publish_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.json");
        std::fs::write(&path, r#"{"type":"state"}"#).unwrap();

        let bootstrap =
            RpcBootstrap::new(Arc::new(FakeRpc::new()), RpcEndpoint::new(GENESIS), Some(path));
        let err = bootstrap.publish_initial_blocks().await.unwrap_err();
        assert!(matches!(err, CommonError::Bootstrap(_)));
    }
}
