//! Process execution layer
//!
//! - Runs one external command per call and waits for it to exit
//! - Captures exit code, stdout and stderr
//! - Hands non-zero exits to the auto-healer instead of returning them
//!
//! The executor knows nothing about orchestration; it only sees argv lists
//! (or shell scripts) and their output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{ControllerError, Result};
use crate::healer::AutoHealer;

/// Maximum output length to capture
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One external command, as argv or as a shell script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Run `program` as a script through `sh -c`
    pub shell: bool,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Argv invocation, no shell interpretation
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            shell: false,
            working_dir: None,
        }
    }

    /// Shell script run via `sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: script.into(),
            args: Vec::new(),
            shell: true,
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn to_command(&self) -> tokio::process::Command {
        let mut cmd = if self.shell {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&self.program);
            cmd
        } else {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(&self.args);
            cmd
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured outcome of one external invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub command: Invocation,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.command.working_dir.as_deref()
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command `{}` failed with exit code {}: {}",
            self.command,
            self.exit_code,
            self.stderr.trim()
        )
    }
}

/// Launches external processes
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; only a failure to launch is an `Err`
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult>;
}

/// Runner backed by real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        debug!("exec: {}", invocation);

        let output = invocation
            .to_command()
            .output()
            .await
            .map_err(|source| ControllerError::Spawn {
                command: invocation.command_line(),
                source,
            })?;

        Ok(ExecutionResult {
            // Killed by a signal: no code
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&output.stdout),
            stderr: truncate_output(&output.stderr),
            command: invocation.clone(),
        })
    }
}

/// Runs commands and routes failures through the auto-healer
pub struct ProcessExecutor {
    runner: Arc<dyn CommandRunner>,
    healer: AutoHealer,
}

impl ProcessExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, healer: AutoHealer) -> Self {
        Self { runner, healer }
    }

    /// Run a fresh command (retry count 0)
    pub async fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        self.execute_with_retry(invocation, 0).await
    }

    /// Run once without healing; a non-zero exit is an execution failure
    pub async fn execute_unhealed(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        let result = self.runner.run(invocation).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(ControllerError::execution_failure(result))
        }
    }

    /// Run a command at a given point of its heal cycle.
    ///
    /// Boxed because healing re-enters the executor.
    pub fn execute_with_retry<'a>(
        &'a self,
        invocation: &'a Invocation,
        retry_count: u32,
    ) -> BoxFuture<'a, Result<ExecutionResult>> {
        Box::pin(async move {
            let result = self.runner.run(invocation).await?;
            if result.success() {
                return Ok(result);
            }

            debug!(
                "`{}` exited with {} (retry {})",
                invocation, result.exit_code, retry_count
            );
            self.healer.heal(self, result, retry_count).await
        })
    }
}

/// Fail with every program in `programs` that is not on `PATH`
pub fn check_dependencies<S: AsRef<str>>(programs: &[S]) -> Result<()> {
    let missing: Vec<String> = programs
        .iter()
        .map(|program| program.as_ref())
        .filter(|program| which::which(program).is_err())
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ControllerError::MissingDependency(missing))
    }
}

/// Lossy UTF-8 conversion, capped at `MAX_OUTPUT_BYTES`
fn truncate_output(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };

    String::from_utf8_lossy(slice).to_string()
}
