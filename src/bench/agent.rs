//! Coding agent execution
//!
//! The agent receives an [`UnsolvedIssue`] and the miner model id, works on
//! the repository checkout, and reports a patch plus its model statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::command::{run_json, CommandSpec};
use crate::error::BenchError;
use crate::marshal::{from_validated, to_structured};
use crate::problem::{IssueSolution, MinerModelStats, UnsolvedIssue};

pub const SUBMITTED: &str = "submitted";

/// What an agent run reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub exit_status: String,
    #[serde(default)]
    pub submission: Option<String>,
    #[serde(default)]
    pub model_stats: Option<MinerModelStats>,
}

impl AgentRun {
    /// The submitted patch, stamped with the measured duration.
    ///
    /// Anything but a `submitted` run with a submission is an
    /// [`BenchError::AgentNotSubmitted`].
    pub fn into_solution(self, duration_s: f64) -> Result<IssueSolution, BenchError> {
        let patch = match (self.exit_status.as_str(), self.submission) {
            (SUBMITTED, Some(patch)) => patch,
            _ => {
                return Err(BenchError::AgentNotSubmitted {
                    exit_status: self.exit_status,
                })
            }
        };

        let model_stats = self.model_stats.map(|stats| MinerModelStats {
            duration_s: Some(duration_s),
            ..stats
        });
        Ok(IssueSolution { patch, model_stats })
    }
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, issue: &UnsolvedIssue, model: &str) -> Result<AgentRun, BenchError>;
}

/// Runs an external agent program with the JSON stdio protocol.
///
/// stdin: `{"issue": {"desc": ..., "local_code_path": ...}, "model": ...}`
/// stdout: `{"exit_status": ..., "submission": ..., "model_stats": {...}}`
pub struct CommandAgent {
    spec: CommandSpec,
}

impl CommandAgent {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl AgentRunner for CommandAgent {
    async fn run(&self, issue: &UnsolvedIssue, model: &str) -> Result<AgentRun, BenchError> {
        info!(
            "Running agent {} with {} on {}",
            self.spec.program,
            model,
            issue.local_code_path.display()
        );
        let input = json!({
            "issue": to_structured(issue)?,
            "model": model,
        });

        let output = run_json("agent", &self.spec, &issue.local_code_path, &input).await?;

        let exit_status = output
            .get("exit_status")
            .and_then(Value::as_str)
            .ok_or_else(|| BenchError::Collaborator {
                stage: "agent",
                message: "agent output has no exit_status".to_string(),
            })?
            .to_string();
        let submission = output
            .get("submission")
            .and_then(Value::as_str)
            .map(str::to_string);
        let model_stats = match output.get("model_stats").filter(|v| !v.is_null()) {
            Some(stats) => Some(from_validated::<MinerModelStats>(stats)?),
            None => None,
        };
        let run = AgentRun {
            exit_status,
            submission,
            model_stats,
        };

        if run.exit_status != SUBMITTED {
            warn!("Agent finished with exit status {}", run.exit_status);
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stats() -> MinerModelStats {
        MinerModelStats {
            api_calls: 4,
            instance_cost: 0.2,
            tokens_received: 1000,
            tokens_sent: 20000,
            total_cost: 0.2,
            duration_s: None,
        }
    }

    #[test]
    fn test_submitted_run_becomes_solution() {
        let run = AgentRun {
            exit_status: "submitted".to_string(),
            submission: Some("diff --git a/x b/x".to_string()),
            model_stats: Some(stats()),
        };
        let solution = run.into_solution(12.5).unwrap();
        assert_eq!(solution.patch, "diff --git a/x b/x");
        assert_eq!(solution.model_stats.unwrap().duration_s, Some(12.5));
    }

    #[test]
    fn test_unsubmitted_runs_rejected() {
        let run = AgentRun {
            exit_status: "exit_cost".to_string(),
            submission: Some("partial".to_string()),
            model_stats: None,
        };
        assert!(matches!(
            run.into_solution(1.0),
            Err(BenchError::AgentNotSubmitted { ref exit_status }) if exit_status == "exit_cost"
        ));

        let run = AgentRun {
            exit_status: "submitted".to_string(),
            submission: None,
            model_stats: None,
        };
        assert!(matches!(
            run.into_solution(1.0),
            Err(BenchError::AgentNotSubmitted { .. })
        ));
    }

    #[tokio::test]
    async fn test_command_agent_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"input=$(cat); case "$input" in *'"model":"gpt-4o"'*) ;; *) exit 9;; esac
echo '{"exit_status":"submitted","submission":"+fix","model_stats":{"api_calls":1,"instance_cost":0.1,"tokens_received":10,"tokens_sent":100,"total_cost":0.1}}'"#;
        let agent = CommandAgent::new(CommandSpec::new("sh").arg("-c").arg(script));
        let issue = UnsolvedIssue {
            desc: "fix it".to_string(),
            local_code_path: dir.path().to_path_buf(),
        };

        let run = agent.run(&issue, "gpt-4o").await.unwrap();
        assert_eq!(run.exit_status, "submitted");
        assert_eq!(run.submission.as_deref(), Some("+fix"));
        assert_eq!(run.model_stats.unwrap().api_calls, 1);
    }

    #[tokio::test]
    async fn test_command_agent_bad_stats() {
        let script = r#"cat > /dev/null; echo '{"exit_status":"submitted","submission":"+x","model_stats":{"api_calls":"many"}}'"#;
        let agent = CommandAgent::new(CommandSpec::new("sh").arg("-c").arg(script));
        let issue = UnsolvedIssue {
            desc: "d".to_string(),
            local_code_path: PathBuf::from("."),
        };
        let err = agent.run(&issue, "m").await.unwrap_err();
        assert!(matches!(err, BenchError::Marshal(_)));
    }
}
