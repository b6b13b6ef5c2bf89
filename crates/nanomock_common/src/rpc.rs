//! Node RPC client
//!
//! JSON-over-HTTP client for the ledger daemon's RPC interface, with
//! bounded retry on transient failures. The controller only depends on the
//! [`NodeRpc`] trait so tests can substitute a fake.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{RpcClientConfig, RpcEndpoint};
use crate::error::{CommonError, Result};

/// Reply of the `block_count` action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCount {
    #[serde(deserialize_with = "u64_from_str")]
    pub count: u64,
    #[serde(deserialize_with = "u64_from_str")]
    pub cemented: u64,
    #[serde(default, deserialize_with = "u64_from_str")]
    pub unchecked: u64,
}

/// Reply of the `version` action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub node_vendor: String,
    #[serde(default)]
    pub build_info: String,
}

impl VersionInfo {
    /// First token of the build info, usually the commit hash
    pub fn version_tag(&self) -> &str {
        self.build_info.split(' ').next().unwrap_or("")
    }
}

/// Ledger RPC numbers arrive as decimal strings; plain numbers are accepted too
fn u64_from_str<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// RPC surface the controller needs from a node
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// `block_count`, retried up to `max_retries` times on transient failure
    async fn block_count(&self, endpoint: &RpcEndpoint, max_retries: u32) -> Result<BlockCount>;

    async fn version(&self, endpoint: &RpcEndpoint) -> Result<VersionInfo>;

    /// Post an arbitrary payload, using the endpoint's credentials when present
    async fn post_with_auth(&self, endpoint: &RpcEndpoint, payload: &Value) -> Result<Value>;
}

/// Request result classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    NetworkError,
    Http4xx,
    Http5xx,
    Timeout,
    NodeError,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NetworkError => "network_error",
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::Timeout => "timeout",
            Self::NodeError => "node_error",
        }
    }

    /// Determine if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::Http5xx | Self::Timeout)
    }
}

/// reqwest-backed implementation of [`NodeRpc`]
#[derive(Clone)]
pub struct HttpNodeRpc {
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpNodeRpc {
    pub fn new(config: &RpcClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CommonError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        })
    }

    fn classify_error(err: &reqwest::Error) -> RequestStatus {
        if err.is_timeout() {
            RequestStatus::Timeout
        } else if let Some(status) = err.status() {
            if status.is_client_error() {
                RequestStatus::Http4xx
            } else if status.is_server_error() {
                RequestStatus::Http5xx
            } else {
                RequestStatus::NetworkError
            }
        } else {
            RequestStatus::NetworkError
        }
    }

    /// Single POST, no retry
    async fn post_once(
        &self,
        endpoint: &RpcEndpoint,
        payload: &Value,
    ) -> (RequestStatus, Result<Value>) {
        let mut request = self.client.post(&endpoint.url).json(payload);
        if let Some(user) = &endpoint.username {
            request = request.basic_auth(user, endpoint.password.as_ref());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let status = Self::classify_error(&e);
                let err = if status == RequestStatus::Timeout {
                    CommonError::RpcTimeout(endpoint.url.clone())
                } else {
                    CommonError::rpc(&endpoint.url, e.to_string())
                };
                return (status, Err(err));
            }
        };

        let http_status = response.status();
        if !http_status.is_success() {
            let status = if http_status.is_client_error() {
                RequestStatus::Http4xx
            } else {
                RequestStatus::Http5xx
            };
            return (
                status,
                Err(CommonError::rpc(&endpoint.url, format!("HTTP {}", http_status))),
            );
        }

        match response.json::<Value>().await {
            Ok(body) => {
                // The node reports action failures in-band with HTTP 200
                if let Some(message) = body.get("error").and_then(Value::as_str) {
                    return (
                        RequestStatus::NodeError,
                        Err(CommonError::rpc(&endpoint.url, message)),
                    );
                }
                (RequestStatus::Success, Ok(body))
            }
            Err(e) => (
                RequestStatus::NetworkError,
                Err(CommonError::rpc(&endpoint.url, format!("invalid JSON reply: {}", e))),
            ),
        }
    }

    /// POST with bounded retry on retryable failures
    async fn post(
        &self,
        endpoint: &RpcEndpoint,
        payload: &Value,
        max_retries: u32,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            debug!(
                "RPC {} -> {} (attempt {}/{})",
                payload.get("action").and_then(|v| v.as_str()).unwrap_or("?"),
                endpoint.url,
                attempt + 1,
                max_retries + 1
            );

            let (status, result) = self.post_once(endpoint, payload).await;
            match result {
                Ok(body) => return Ok(body),
                Err(e) if status.is_retryable() && attempt < max_retries => {
                    warn!("RPC {} failed ({}), retrying: {}", endpoint.url, status.as_str(), e);
                    attempt += 1;
                    sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl NodeRpc for HttpNodeRpc {
    async fn block_count(&self, endpoint: &RpcEndpoint, max_retries: u32) -> Result<BlockCount> {
        let body = self
            .post(endpoint, &json!({ "action": "block_count" }), max_retries)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn version(&self, endpoint: &RpcEndpoint) -> Result<VersionInfo> {
        let body = self
            .post(endpoint, &json!({ "action": "version" }), self.max_retries)
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn post_with_auth(&self, endpoint: &RpcEndpoint, payload: &Value) -> Result<Value> {
        self.post(endpoint, payload, self.max_retries).await
    }
}
