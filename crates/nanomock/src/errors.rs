//! Error taxonomy and exit status for nanomock

use nanomock_common::CommonError;
use thiserror::Error;

use crate::executor::ExecutionResult;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when the command name is not registered
pub const EXIT_INVALID_COMMAND: i32 = 64;

/// Exit code when a command is missing required input
pub const EXIT_VALIDATION: i32 = 65;

/// Exit code when a required external binary is not installed
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Exit code when an external process failed and could not be healed
pub const EXIT_EXECUTION_FAILURE: i32 = 70;

/// Exit code when nodes did not become reachable in time
pub const EXIT_REACHABILITY_TIMEOUT: i32 = 75;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ExecutionFailure(Box<ExecutionResult>),

    #[error("TIMEOUT: RPCs not reachable for nodes {}", .nodes.join(", "))]
    ReachabilityTimeout { nodes: Vec<String> },

    #[error("Required binaries not found in PATH: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn execution_failure(result: ExecutionResult) -> Self {
        ControllerError::ExecutionFailure(Box::new(result))
    }

    /// Process exit code for this error
    pub fn code(&self) -> i32 {
        match self {
            ControllerError::InvalidCommand(_) => EXIT_INVALID_COMMAND,
            ControllerError::Validation(_) => EXIT_VALIDATION,
            ControllerError::ExecutionFailure(_) | ControllerError::Spawn { .. } => {
                EXIT_EXECUTION_FAILURE
            }
            ControllerError::ReachabilityTimeout { .. } => EXIT_REACHABILITY_TIMEOUT,
            ControllerError::MissingDependency(_) => EXIT_UNAVAILABLE,
            ControllerError::Common(_) | ControllerError::Io(_) | ControllerError::Json(_) => {
                EXIT_GENERAL_ERROR
            }
        }
    }

    /// Short machine-readable name, used in the invocation log
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::InvalidCommand(_) => "invalid_command",
            ControllerError::Validation(_) => "validation",
            ControllerError::ExecutionFailure(_) => "execution_failure",
            ControllerError::ReachabilityTimeout { .. } => "reachability_timeout",
            ControllerError::MissingDependency(_) => "missing_dependency",
            ControllerError::Spawn { .. } => "spawn",
            ControllerError::Common(_) => "common",
            ControllerError::Io(_) => "io",
            ControllerError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
