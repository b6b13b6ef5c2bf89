//! Invocation log for the nanomock CLI
//!
//! One JSONL record per invocation, appended to the first usable path of:
//! 1. `$NANOMOCK_LOG_FILE`
//! 2. `$XDG_STATE_HOME/nanomock/ctl.jsonl`
//! 3. `~/.local/state/nanomock/ctl.jsonl`

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::ControllerError;

/// Log entry for each nanomock invocation
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp
    pub ts: String,

    /// Request ID (UUID)
    pub req_id: String,

    pub command: String,

    #[serde(default)]
    pub nodes: Vec<String>,

    pub exit_code: i32,

    pub duration_ms: u64,

    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl From<&ControllerError> for ErrorDetails {
    fn from(err: &ControllerError) -> Self {
        Self {
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl LogEntry {
    pub fn new(command: &str, nodes: &[String]) -> Self {
        Self {
            ts: Self::now(),
            req_id: Self::generate_req_id(),
            command: command.to_string(),
            nodes: nodes.to_vec(),
            exit_code: 0,
            duration_ms: 0,
            ok: true,
            error: None,
        }
    }

    /// Fill in the outcome of the invocation
    pub fn finish(mut self, outcome: Result<(), &ControllerError>, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        match outcome {
            Ok(()) => {
                self.exit_code = crate::errors::EXIT_SUCCESS;
                self.ok = true;
            }
            Err(err) => {
                self.exit_code = err.code();
                self.ok = false;
                self.error = Some(ErrorDetails::from(err));
            }
        }
        self
    }

    fn discover_log_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("NANOMOCK_LOG_FILE") {
            return Some(PathBuf::from(path));
        }

        if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
            return Some(Path::new(&xdg_state).join("nanomock/ctl.jsonl"));
        }

        if let Ok(home) = std::env::var("HOME") {
            return Some(Path::new(&home).join(".local/state/nanomock/ctl.jsonl"));
        }

        None
    }

    /// Append to the discovered log file. Failures are reported at debug level only.
    pub fn write(&self) {
        let Some(path) = Self::discover_log_path() else {
            debug!("No invocation log path available");
            return;
        };

        if let Err(e) = self.write_to(&path) {
            debug!("Could not write invocation log {}: {}", path.display(), e);
        }
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    pub fn generate_req_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_records_error() {
        let err = ControllerError::Validation("Missing payload for rpc command".to_string());
        let entry = LogEntry::new("rpc", &[]).finish(Err(&err), 3);

        assert!(!entry.ok);
        assert_eq!(entry.exit_code, crate::errors::EXIT_VALIDATION);
        let details = entry.error.as_ref().unwrap();
        assert_eq!(details.code, "validation");
    }

    #[test]
    fn test_write_appends_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/ctl.jsonl");

        LogEntry::new("start", &["pr1".to_string()])
            .finish(Ok(()), 12)
            .write_to(&path)
            .unwrap();
        LogEntry::new("stop", &[]).finish(Ok(()), 4).write_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: LogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.command, "start");
        assert_eq!(first.nodes, vec!["pr1"]);
        assert!(first.ok);
        assert!(!lines[0].contains("\"error\""));
    }
}
