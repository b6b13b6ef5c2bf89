//! Error types shared by the nanomock crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("RPC error at {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("RPC timeout at {0}")]
    RpcTimeout(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

impl CommonError {
    pub fn rpc(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        CommonError::Rpc {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommonError>;
