//! Nanomock - controller for a local multi-node ledger test network
//!
//! Drives the container orchestration tool, heals known transient faults,
//! waits for node RPC readiness and aggregates per-node sync status.

pub mod cli;
pub mod compose;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod fakes;
pub mod healer;
pub mod logging;
pub mod readiness;
pub mod status;

pub use dispatcher::{CommandName, Controller, Request};
pub use errors::{ControllerError, Result};
