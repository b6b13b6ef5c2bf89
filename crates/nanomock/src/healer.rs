//! Auto-Healer
//!
//! Recovers from known transient orchestration faults. A failed command's
//! stderr is matched against an ordered rule table; the first matching rule
//! names a container to restart or remove, the remediation runs through the
//! executor, and the original command is issued again. At most
//! [`MAX_HEAL_RETRIES`] remediation cycles run for one originating command.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{ControllerError, Result};
use crate::executor::{ExecutionResult, Invocation, ProcessExecutor};

/// Hard ceiling on remediation cycles per originating command
pub const MAX_HEAL_RETRIES: u32 = 10;

/// What to do with the container named in the fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationKind {
    /// Stop, settle, start again (port still bound by a stale container)
    RestartContainer,
    /// Stop and remove (name already taken by a leftover container)
    RemoveContainer,
}

/// A classified fault, ready to be acted on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub rule: &'static str,
    pub kind: RemediationKind,
    pub container: String,
}

/// One step of a remediation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationStep {
    Run(Invocation),
    Settle(Duration),
}

impl Remediation {
    pub fn steps(&self, container_command: &str, settle: Duration) -> Vec<RemediationStep> {
        let stop = Invocation::new(container_command, ["stop", "-t", "0", self.container.as_str()]);
        match self.kind {
            RemediationKind::RestartContainer => vec![
                RemediationStep::Run(stop),
                RemediationStep::Settle(settle),
                RemediationStep::Run(Invocation::new(
                    container_command,
                    ["start", self.container.as_str()],
                )),
            ],
            RemediationKind::RemoveContainer => vec![
                RemediationStep::Run(stop),
                RemediationStep::Run(Invocation::new(
                    container_command,
                    ["rm", self.container.as_str()],
                )),
                RemediationStep::Settle(settle),
            ],
        }
    }
}

/// Maps captured stderr to a remediation
pub trait FaultClassifier: Send + Sync {
    fn classify(&self, stderr: &str) -> Option<Remediation>;
}

/// Pattern -> remediation entry
pub struct HealRule {
    pub name: &'static str,
    /// Substring that selects this rule
    pub pattern: &'static str,
    pub kind: RemediationKind,
    /// Captures the container name in group 1
    extractor: Regex,
}

impl HealRule {
    pub fn extract(&self, stderr: &str) -> Option<String> {
        self.extractor
            .captures(stderr)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Built-in rules, in match order
static DEFAULT_RULES: LazyLock<Vec<HealRule>> = LazyLock::new(|| {
    vec![
        // Port still held: "... programming external connectivity on endpoint genesis (...)"
        HealRule {
            name: "address_in_use",
            pattern: "programming external connectivity on endpoint",
            kind: RemediationKind::RestartContainer,
            extractor: Regex::new(r"programming external connectivity on endpoint ([\w.-]+)")
                .unwrap(),
        },
        // Name taken: 'Conflict. The container name "/genesis" is already in use ...'
        HealRule {
            name: "docker_in_use",
            pattern: "Error response from daemon: Conflict. The container name",
            kind: RemediationKind::RemoveContainer,
            extractor: Regex::new(r#"Conflict\. The container name "/([^"]+)""#).unwrap(),
        },
    ]
});

/// Ordered rule table; first pattern hit wins
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleTable;

impl RuleTable {
    pub fn rules(&self) -> &'static [HealRule] {
        &DEFAULT_RULES
    }
}

impl FaultClassifier for RuleTable {
    fn classify(&self, stderr: &str) -> Option<Remediation> {
        let rule = self.rules().iter().find(|r| stderr.contains(r.pattern))?;

        match rule.extract(stderr) {
            Some(container) => Some(Remediation {
                rule: rule.name,
                kind: rule.kind,
                container,
            }),
            None => {
                warn!("{}: matched but no container name found in stderr", rule.name);
                None
            }
        }
    }
}

/// Applies remediations and re-issues the failed command
pub struct AutoHealer {
    classifier: Arc<dyn FaultClassifier>,
    container_command: String,
    settle: Duration,
}

impl AutoHealer {
    /// Healer with the built-in rule table
    pub fn new(container_command: impl Into<String>, settle: Duration) -> Self {
        Self::with_classifier(Arc::new(RuleTable), container_command, settle)
    }

    pub fn with_classifier(
        classifier: Arc<dyn FaultClassifier>,
        container_command: impl Into<String>,
        settle: Duration,
    ) -> Self {
        Self {
            classifier,
            container_command: container_command.into(),
            settle,
        }
    }

    /// Recover from `failure` or surface it.
    ///
    /// Errors always carry the original failure, never the remediation's.
    pub async fn heal(
        &self,
        executor: &ProcessExecutor,
        failure: ExecutionResult,
        retry_count: u32,
    ) -> Result<ExecutionResult> {
        if retry_count >= MAX_HEAL_RETRIES {
            warn!(
                "Giving up on `{}` after {} heal attempts",
                failure.command, retry_count
            );
            return Err(ControllerError::execution_failure(failure));
        }

        let Some(remediation) = self.classifier.classify(&failure.stderr) else {
            return Err(ControllerError::execution_failure(failure));
        };

        warn!(
            "Retry attempt {}... {} ({}): \n {}",
            retry_count,
            remediation.rule,
            remediation.container,
            failure.stderr.trim()
        );

        for step in remediation.steps(&self.container_command, self.settle) {
            match step {
                RemediationStep::Run(invocation) => {
                    // Remediation never heals itself
                    if let Err(e) = executor.execute_unhealed(&invocation).await {
                        warn!("Remediation `{}` failed: {}", invocation, e);
                        return Err(ControllerError::execution_failure(failure));
                    }
                }
                RemediationStep::Settle(pause) => tokio::time::sleep(pause).await,
            }
        }

        info!(
            "Healed {} on {}, re-running `{}`",
            remediation.rule, remediation.container, failure.command
        );
        executor
            .execute_with_retry(&failure.command, retry_count + 1)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeRunner;

    const PORT_FAULT: &str = "ERROR: for genesis  Cannot start service genesis: driver failed \
        programming external connectivity on endpoint genesis (4f1c0a): Bind for 0.0.0.0:45000 \
        failed: port is already allocated";

    const NAME_FAULT: &str = "Error response from daemon: Conflict. The container name \"/pr1\" \
        is already in use by container \"9d2e\". You have to remove (or rename) that container.";

    fn executor(runner: Arc<FakeRunner>) -> ProcessExecutor {
        ProcessExecutor::new(runner, AutoHealer::new("docker", Duration::ZERO))
    }

    #[test]
    fn test_classify_port_fault() {
        let remediation = RuleTable.classify(PORT_FAULT).unwrap();
        assert_eq!(remediation.rule, "address_in_use");
        assert_eq!(remediation.kind, RemediationKind::RestartContainer);
        assert_eq!(remediation.container, "genesis");
    }

    #[test]
    fn test_classify_name_conflict() {
        let remediation = RuleTable.classify(NAME_FAULT).unwrap();
        assert_eq!(remediation.rule, "docker_in_use");
        assert_eq!(remediation.kind, RemediationKind::RemoveContainer);
        assert_eq!(remediation.container, "pr1");
    }

    #[test]
    fn test_classify_unknown_fault() {
        assert!(RuleTable.classify("no such service: ghost").is_none());
        assert!(RuleTable.classify("").is_none());
    }

    #[test]
    fn test_matched_pattern_without_name_is_unhealable() {
        let stderr = "Error response from daemon: Conflict. The container name is garbled";
        assert!(RuleTable.classify(stderr).is_none());
    }

    #[test]
    fn test_first_rule_wins() {
        let both = format!("{}\n{}", PORT_FAULT, NAME_FAULT);
        assert_eq!(RuleTable.classify(&both).unwrap().rule, "address_in_use");
    }

    #[test]
    fn test_remediation_steps() {
        let restart = Remediation {
            rule: "address_in_use",
            kind: RemediationKind::RestartContainer,
            container: "genesis".to_string(),
        };
        let steps = restart.steps("docker", Duration::from_secs(5));
        assert_eq!(
            steps,
            vec![
                RemediationStep::Run(Invocation::new("docker", ["stop", "-t", "0", "genesis"])),
                RemediationStep::Settle(Duration::from_secs(5)),
                RemediationStep::Run(Invocation::new("docker", ["start", "genesis"])),
            ]
        );

        let remove = Remediation {
            kind: RemediationKind::RemoveContainer,
            ..restart
        };
        let lines: Vec<_> = remove
            .steps("podman", Duration::ZERO)
            .into_iter()
            .filter_map(|s| match s {
                RemediationStep::Run(inv) => Some(inv.command_line()),
                RemediationStep::Settle(_) => None,
            })
            .collect();
        assert_eq!(lines, vec!["podman stop -t 0 genesis", "podman rm genesis"]);
    }

    #[tokio::test]
    async fn test_heals_port_fault_then_succeeds() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond_once("up -d", 1, "", PORT_FAULT);
        runner.respond("up -d", 0, "started", "");
        let executor = executor(runner.clone());

        let result = executor
            .execute(&Invocation::new("docker-compose", ["up", "-d"]))
            .await
            .unwrap();

        assert_eq!(result.stdout, "started");
        assert_eq!(
            runner.command_lines(),
            vec![
                "docker-compose up -d",
                "docker stop -t 0 genesis",
                "docker start genesis",
                "docker-compose up -d",
            ]
        );
    }

    #[tokio::test]
    async fn test_heals_name_conflict_by_removal() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond_once("up -d", 1, "", NAME_FAULT);
        let executor = executor(runner.clone());

        executor
            .execute(&Invocation::new("docker-compose", ["up", "-d"]))
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "docker-compose up -d",
                "docker stop -t 0 pr1",
                "docker rm pr1",
                "docker-compose up -d",
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_ceiling_surfaces_original_failure() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("up -d", 1, "", PORT_FAULT);
        let executor = executor(runner.clone());

        let inv = Invocation::new("docker-compose", ["up", "-d"]);
        let err = executor.execute(&inv).await.unwrap_err();

        match err {
            ControllerError::ExecutionFailure(failure) => {
                assert_eq!(failure.stderr, PORT_FAULT);
                assert_eq!(failure.command, inv);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let lines = runner.command_lines();
        let originals = lines.iter().filter(|l| l.as_str() == "docker-compose up -d").count();
        let restarts = lines.iter().filter(|l| l.starts_with("docker start")).count();
        assert_eq!(originals, (MAX_HEAL_RETRIES + 1) as usize);
        assert_eq!(restarts, MAX_HEAL_RETRIES as usize);
    }

    #[tokio::test]
    async fn test_failed_remediation_surfaces_original_failure() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("up -d", 1, "", NAME_FAULT);
        runner.respond("docker rm", 1, "", "Error: No such container: pr1");
        let executor = executor(runner.clone());

        let err = executor
            .execute(&Invocation::new("docker-compose", ["up", "-d"]))
            .await
            .unwrap_err();

        match err {
            ControllerError::ExecutionFailure(failure) => assert_eq!(failure.stderr, NAME_FAULT),
            other => panic!("unexpected error: {other:?}"),
        }
        // No second attempt of the original command
        assert_eq!(
            runner.command_lines(),
            vec!["docker-compose up -d", "docker stop -t 0 pr1", "docker rm pr1"]
        );
    }

    #[tokio::test]
    async fn test_remediation_hitting_same_fault_is_not_healed() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("up -d", 1, "", PORT_FAULT);
        runner.respond("docker start", 1, "", PORT_FAULT);
        let executor = executor(runner.clone());

        let inv = Invocation::new("docker-compose", ["up", "-d"]);
        let err = tokio::time::timeout(Duration::from_secs(3), executor.execute(&inv))
            .await
            .expect("healing must terminate")
            .unwrap_err();

        match err {
            ControllerError::ExecutionFailure(failure) => {
                assert_eq!(failure.command, inv);
                assert_eq!(failure.stderr, PORT_FAULT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            runner.command_lines(),
            vec!["docker-compose up -d", "docker stop -t 0 genesis", "docker start genesis"]
        );
    }

    #[tokio::test]
    async fn test_heal_at_ceiling_does_not_remediate() {
        let runner = Arc::new(FakeRunner::new());
        let executor = executor(runner.clone());
        let failure = ExecutionResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: PORT_FAULT.to_string(),
            command: Invocation::new("docker-compose", ["up", "-d"]),
        };

        let healer = AutoHealer::new("docker", Duration::ZERO);
        let err = healer
            .heal(&executor, failure.clone(), MAX_HEAL_RETRIES)
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::ExecutionFailure(f) if *f == failure));
        assert!(runner.invocations().is_empty());
    }
}
