//! Problem evaluator
//!
//! Runs the agent on each generated problem, tests its patch, then grades and
//! scores it. Problems are evaluated one after another; a failure is reported
//! for that problem only.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::grader::Grader;
use crate::bench::{AgentRunner, TestRunner};
use crate::error::BenchError;
use crate::problem::{EvaluationLog, FullyScoredProblem, GeneratedProblemStatement, MinerSolutionTestResults, UnsolvedIssue};
use crate::util::{truncate, with_timeout};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Model the agent solves with
    pub miner_model: String,
    pub agent_timeout_secs: u64,
    pub tests_timeout_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            miner_model: "gpt-4o".to_string(),
            agent_timeout_secs: 1800,
            tests_timeout_secs: 600,
        }
    }
}

/// Outcome of one problem in a batch
#[derive(Debug)]
pub struct ProblemOutcome {
    pub problem_statement: String,
    pub result: Result<FullyScoredProblem, BenchError>,
}

pub struct Evaluator {
    agent: Arc<dyn AgentRunner>,
    tests: Arc<dyn TestRunner>,
    grader: Grader,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(
        agent: Arc<dyn AgentRunner>,
        tests: Arc<dyn TestRunner>,
        grader: Grader,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            agent,
            tests,
            grader,
            config,
        }
    }

    /// Solve, test, grade and score a single problem.
    pub async fn run_one(
        &self,
        repo: &str,
        statement: GeneratedProblemStatement,
    ) -> Result<FullyScoredProblem, BenchError> {
        let issue = UnsolvedIssue {
            desc: statement.problem_statement.clone(),
            local_code_path: statement.repo_path.clone(),
        };

        let start = Instant::now();
        let run = with_timeout(
            "agent",
            self.config.agent_timeout_secs,
            self.agent.run(&issue, &self.config.miner_model),
        )
        .await??;
        let time_to_solve_s = start.elapsed().as_secs_f64();
        info!("Agent finished in {:.1}s ({})", time_to_solve_s, run.exit_status);

        let mut problem =
            FullyScoredProblem::new(repo, statement, &self.config.miner_model, time_to_solve_s);
        let solution = run.into_solution(time_to_solve_s)?;
        problem.attach_solution(solution.clone());

        let test_results = if solution.is_empty() {
            MinerSolutionTestResults::default()
        } else {
            with_timeout(
                "tests",
                self.config.tests_timeout_secs,
                self.tests
                    .run(&problem.generated_problem_statement.repo_path, &solution.patch),
            )
            .await??
        };

        let score = self
            .grader
            .grade_and_score(&problem.generated_problem_statement, &solution, test_results)
            .await?;
        info!("Problem scored {:.4}", score.total_score);
        problem.attach_score(score)?;

        Ok(problem)
    }

    /// Evaluate every statement, in order.
    pub async fn run_batch(
        &self,
        repo: &str,
        statements: Vec<GeneratedProblemStatement>,
    ) -> Vec<ProblemOutcome> {
        let total = statements.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, statement) in statements.into_iter().enumerate() {
            let problem_statement = statement.problem_statement.clone();
            info!(
                "Problem [{}/{}] {}: {}",
                index + 1,
                total,
                repo,
                truncate(&problem_statement, 80)
            );

            let result = self.run_one(repo, statement).await;
            if let Err(e) = &result {
                error!("Problem [{}/{}] failed: {}", index + 1, total, e);
            }
            outcomes.push(ProblemOutcome {
                problem_statement,
                result,
            });
        }

        let scored = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!("Evaluated {}: {}/{} problems scored", repo, scored, total);
        outcomes
    }
}

/// Append the scored problems of a batch to `log` as one run. Returns how
/// many were recorded.
pub fn record_outcomes(log: &mut EvaluationLog, repo: &str, outcomes: Vec<ProblemOutcome>) -> usize {
    let problems: Vec<FullyScoredProblem> = outcomes
        .into_iter()
        .filter_map(|o| o.result.ok())
        .collect();
    let recorded = problems.len();
    if recorded > 0 {
        log.record(repo, problems);
    }
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::AgentRun;
    use crate::evaluation::GraderConfig;
    use crate::llm_client::{TokenUsage, UpstreamError};
    use crate::problem::{MinerModelStats, MinerSolutionTestResults};
    use crate::scoring::{ScoreCalculator, ScoringWeights, EMPTY_PATCH_SCORE};
    use crate::testing::ScriptedModel;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies by problem statement text.
    struct FakeAgent {
        slow: bool,
    }

    #[async_trait]
    impl AgentRunner for FakeAgent {
        async fn run(&self, issue: &UnsolvedIssue, _model: &str) -> Result<AgentRun, BenchError> {
            if self.slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let (exit_status, submission) = match issue.desc.as_str() {
                "gives up" => ("exit_cost", None),
                "empty" => ("submitted", Some("")),
                _ => ("submitted", Some("+fix")),
            };
            Ok(AgentRun {
                exit_status: exit_status.to_string(),
                submission: submission.map(str::to_string),
                model_stats: Some(MinerModelStats {
                    api_calls: 3,
                    instance_cost: 0.05,
                    tokens_received: 200,
                    tokens_sent: 4000,
                    total_cost: 0.05,
                    duration_s: None,
                }),
            })
        }
    }

    #[derive(Default)]
    struct FakeTests {
        patches: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestRunner for FakeTests {
        async fn run(&self, _repo_path: &Path, patch: &str) -> Result<MinerSolutionTestResults, BenchError> {
            self.patches.lock().unwrap().push(patch.to_string());
            Ok(MinerSolutionTestResults {
                pass_previously: 6,
                pass_after: 10,
                fail_previously: 2,
                fail_after: 1,
                synthetic_test_passed: true,
            })
        }
    }

    fn statement(text: &str) -> GeneratedProblemStatement {
        GeneratedProblemStatement {
            repo_path: PathBuf::from("."),
            prompt: "File: a.py".to_string(),
            model: "gpt-4o".to_string(),
            problem_statement: text.to_string(),
            dynamic_checklist: vec!["works".to_string(), "tested".to_string()],
            model_stats: None,
        }
    }

    fn evaluation() -> serde_json::Value {
        json!({
            "addresses_problem_in_statement": true,
            "logical_solution": true,
            "brevity_and_cleanliness_of_code": true,
            "no_new_bugs": true,
            "dynamic_checklist_scores": [true, true],
            "explanation_of_scores": "ok"
        })
    }

    fn evaluator(llm: ScriptedModel, slow: bool, tests: Arc<FakeTests>) -> Evaluator {
        let weights = ScoringWeights::with_judgment_weight(0.1, 0.4, 0.2, 0.0);
        let grader = Grader::new(
            Arc::new(llm),
            GraderConfig::default(),
            ScoreCalculator::new(weights).unwrap(),
        );
        Evaluator::new(
            Arc::new(FakeAgent { slow }),
            tests,
            grader,
            EvaluatorConfig {
                miner_model: "gpt-4o-mini".to_string(),
                agent_timeout_secs: 1,
                tests_timeout_secs: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_run_one_full_pipeline() {
        let llm = ScriptedModel::new()
            .text("+fix")
            .structured(evaluation(), TokenUsage::default());
        let tests = Arc::new(FakeTests::default());
        let problem = evaluator(llm, false, tests.clone())
            .run_one("acme/widgets", statement("crash on start"))
            .await
            .unwrap();

        assert_eq!(problem.repo, "acme/widgets");
        assert_eq!(problem.miner_llm, "gpt-4o-mini");
        assert_eq!(problem.miner_solution().unwrap().patch, "+fix");
        let stats = problem.miner_solution().unwrap().model_stats.as_ref().unwrap();
        assert_eq!(stats.duration_s, Some(problem.time_to_solve_s));
        assert!((problem.miner_output_score().unwrap().total_score - 1.0).abs() < 1e-9);
        assert_eq!(tests.patches.lock().unwrap().as_slice(), ["+fix".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_patch_skips_tests_and_grading() {
        let tests = Arc::new(FakeTests::default());
        let problem = evaluator(ScriptedModel::new(), false, tests.clone())
            .run_one("acme/widgets", statement("empty"))
            .await
            .unwrap();
        assert_eq!(problem.miner_output_score(), Some(&*EMPTY_PATCH_SCORE));
        assert!(tests.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_timeout() {
        let err = evaluator(ScriptedModel::new(), true, Arc::new(FakeTests::default()))
            .run_one("r", statement("slow"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::Upstream(UpstreamError::Timeout { stage: "agent", secs: 1 })
        ));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let llm = ScriptedModel::new()
            .text("+fix")
            .structured(evaluation(), TokenUsage::default());
        let outcomes = evaluator(llm, false, Arc::new(FakeTests::default()))
            .run_batch(
                "acme/widgets",
                vec![statement("gives up"), statement("crash on start")],
            )
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0].result,
            Err(BenchError::AgentNotSubmitted { .. })
        ));
        assert!(outcomes[1].result.as_ref().unwrap().is_scored());

        let mut log = EvaluationLog::new();
        assert_eq!(record_outcomes(&mut log, "acme/widgets", outcomes), 1);
        assert_eq!(log.problems().count(), 1);
    }
}
