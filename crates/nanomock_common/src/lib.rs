//! Nanomock Common - configuration and collaborators shared by the controller
//!
//! Network config, node RPC client, ledger bootstrap, on-disk layout, and
//! fakes of each collaborator for tests.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fakes;
pub mod layout;
pub mod logging;
pub mod rpc;

pub use config::{NetworkConfig, NodeConfig, NodeId, RpcEndpoint};
pub use error::CommonError;
