//! Fake command runner for deterministic testing
//!
//! Answers invocations from scripted responses without launching processes.
//!
//! ```rust,ignore
//! let runner = FakeRunner::new();
//! runner.respond_once("up -d", 1, "", "port is already allocated");
//! runner.respond("docker ps", 0, "genesis\npr1\n", "");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::errors::Result;
use crate::executor::{CommandRunner, ExecutionResult, Invocation};

/// Scripted process outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl FakeOutput {
    pub fn new(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn ok(stdout: &str) -> Self {
        Self::new(0, stdout, "")
    }
}

type Handler = Box<dyn Fn(&Invocation) -> Option<FakeOutput> + Send + Sync>;

/// Fake runner: one-shot responses, then the handler, then sticky responses.
/// Anything unmatched succeeds with empty output.
#[derive(Default)]
pub struct FakeRunner {
    once: Mutex<Vec<(String, VecDeque<FakeOutput>)>>,
    sticky: Mutex<Vec<(String, FakeOutput)>>,
    handler: Option<Handler>,
    invocations: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute responses from a closure, e.g. to simulate container state
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Option<FakeOutput> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    /// Answer every invocation whose command line contains `pattern`
    pub fn respond(&self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.sticky.lock().unwrap().push((
            pattern.to_string(),
            FakeOutput::new(exit_code, stdout, stderr),
        ));
    }

    /// Answer the next matching invocation only; queued per pattern
    pub fn respond_once(&self, pattern: &str, exit_code: i32, stdout: &str, stderr: &str) {
        let output = FakeOutput::new(exit_code, stdout, stderr);
        let mut once = self.once.lock().unwrap();
        match once.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, queue)) => queue.push_back(output),
            None => once.push((pattern.to_string(), VecDeque::from([output]))),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Command lines of all invocations, in order
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    fn answer(&self, line: &str, invocation: &Invocation) -> FakeOutput {
        {
            let mut once = self.once.lock().unwrap();
            for (pattern, queue) in once.iter_mut() {
                if line.contains(pattern.as_str()) {
                    if let Some(output) = queue.pop_front() {
                        return output;
                    }
                }
            }
        }

        if let Some(handler) = &self.handler {
            if let Some(output) = handler(invocation) {
                return output;
            }
        }

        self.sticky
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| FakeOutput::ok(""))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let output = self.answer(&invocation.command_line(), invocation);
        Ok(ExecutionResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            command: invocation.clone(),
        })
    }
}
