//! Test-suite execution around a patch

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use tracing::info;

use super::command::{run_json, CommandSpec};
use crate::error::BenchError;
use crate::marshal::from_structured;
use crate::problem::MinerSolutionTestResults;

/// Runs a repository's tests before and after applying a patch.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, repo_path: &Path, patch: &str) -> Result<MinerSolutionTestResults, BenchError>;
}

/// Test runner program with the JSON stdio protocol.
///
/// stdin: `{"repo_path": ..., "patch": ...}`
/// stdout: a `MinerSolutionTestResults` mapping
pub struct CommandTestRunner {
    spec: CommandSpec,
}

impl CommandTestRunner {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, repo_path: &Path, patch: &str) -> Result<MinerSolutionTestResults, BenchError> {
        let input = json!({
            "repo_path": repo_path.to_string_lossy(),
            "patch": patch,
        });
        let output = run_json("tests", &self.spec, repo_path, &input).await?;
        let results: MinerSolutionTestResults = from_structured(&output)?;

        info!(
            "Tests: pass {} -> {}, fail {} -> {}, synthetic {}",
            results.pass_previously,
            results.pass_after,
            results.fail_previously,
            results.fail_after,
            if results.synthetic_test_passed { "passed" } else { "failed" }
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::MarshalError;

    fn runner(output: &str) -> CommandTestRunner {
        CommandTestRunner::new(
            CommandSpec::new("sh")
                .arg("-c")
                .arg(format!("cat > /dev/null; echo '{}'", output)),
        )
    }

    #[tokio::test]
    async fn test_results_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let results = runner(r#"{"pass_previously":5,"pass_after":7,"fail_previously":2,"fail_after":0,"synthetic_test_passed":true,"runner":"pytest"}"#)
            .run(dir.path(), "+x")
            .await
            .unwrap();
        assert_eq!(results.pass_delta(), 2);
        assert_eq!(results.fail_delta(), 2);
        assert!(results.synthetic_test_passed);
    }

    #[tokio::test]
    async fn test_missing_count_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = runner(r#"{"pass_previously":5,"pass_after":7,"fail_previously":2,"synthetic_test_passed":true}"#)
            .run(dir.path(), "+x")
            .await
            .unwrap_err();
        match err {
            BenchError::Marshal(MarshalError::MissingField { field, record }) => {
                assert_eq!(field, "fail_after");
                assert_eq!(record, "MinerSolutionTestResults");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
