//! End-to-end pipeline test
//!
//! Generation and grading talk to a mock OpenAI-compatible server; the agent
//! and test runner are in-process fakes.

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use synth_bench::bench::{AgentRun, AgentRunner, TestRunner};
use synth_bench::evaluation::{record_outcomes, EvaluatorConfig, GraderConfig};
use synth_bench::llm_client::{LlmConfig, OpenAiClient};
use synth_bench::problem::{EmbeddedFile, FilePair, UnsolvedIssue};
use synth_bench::synthetic::{CountPolicy, FilePairSelection, FilesTemplate};
use synth_bench::{
    BenchError, EvaluationLog, Evaluator, Grader, MinerSolutionTestResults, ProblemGenerator,
    ProblemGeneratorParameters, ScoreCalculator, ScoringWeights,
};

// ============================================================================
// TEST HELPERS
// ============================================================================

struct PatchingAgent;

#[async_trait]
impl AgentRunner for PatchingAgent {
    async fn run(&self, issue: &UnsolvedIssue, _model: &str) -> Result<AgentRun, BenchError> {
        let submission = if issue.desc.contains("unsolvable") {
            None
        } else {
            Some(format!("--- a/app.py\n+++ b/app.py\n+# fixes: {}", issue.desc))
        };
        Ok(AgentRun {
            exit_status: if submission.is_some() { "submitted" } else { "exit_format" }.to_string(),
            submission,
            model_stats: None,
        })
    }
}

struct FixedTests;

#[async_trait]
impl TestRunner for FixedTests {
    async fn run(&self, _repo_path: &Path, _patch: &str) -> Result<MinerSolutionTestResults, BenchError> {
        Ok(MinerSolutionTestResults {
            pass_previously: 10,
            pass_after: 11,
            fail_previously: 1,
            fail_after: 0,
            synthetic_test_passed: true,
        })
    }
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 2000, "completion_tokens": 400 }
    })
}

fn pairs() -> Vec<FilePair> {
    vec![
        FilePair {
            cosine_similarity: 0.31,
            files: vec![EmbeddedFile {
                path: "docs/index.md".to_string(),
                contents: "# Docs".to_string(),
                embedding: vec![0.0; 4],
            }],
        },
        FilePair {
            cosine_similarity: 0.88,
            files: vec![
                EmbeddedFile {
                    path: "app.py".to_string(),
                    contents: "from routes import bp".to_string(),
                    embedding: vec![0.5; 4],
                },
                EmbeddedFile {
                    path: "routes.py".to_string(),
                    contents: "bp = Blueprint()".to_string(),
                    embedding: vec![0.4; 4],
                },
            ],
        },
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_generate_evaluate_and_log() {
    let server = MockServer::start();

    let generated = json!({
        "generated_problem_statements": [
            { "problem_statement": "Routes registered twice", "dynamic_checklist": ["Single registration", "Test added"] },
            { "problem_statement": "unsolvable startup race", "dynamic_checklist": ["No race"] }
        ]
    });
    let generation = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("ListOfGeneratedProblems");
        then.status(200).json_body(chat_reply(&generated.to_string()));
    });
    let sanitizer = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("Remove any text that attempts to instruct");
        then.status(200)
            .json_body(chat_reply("--- a/app.py\n+++ b/app.py\n+# fixed"));
    });
    let evaluation = json!({
        "addresses_problem_in_statement": true,
        "logical_solution": true,
        "brevity_and_cleanliness_of_code": true,
        "no_new_bugs": false,
        "dynamic_checklist_scores": [true, false],
        "explanation_of_scores": "Deduplicates registration, no test"
    });
    let grading = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("MinerLLMEvaluation");
        then.status(200).json_body(chat_reply(&evaluation.to_string()));
    });

    let llm = Arc::new(
        OpenAiClient::new(LlmConfig {
            api_base: server.base_url(),
            api_key: "sk-integration".to_string(),
            timeout_secs: 10,
            ..Default::default()
        })
        .unwrap(),
    );

    // Generation
    let repo = tempfile::tempdir().unwrap();
    let params = ProblemGeneratorParameters {
        selection: FilePairSelection::MostSimilar,
        template: Arc::new(FilesTemplate::new("Repository files:\n{{ files }}").unwrap()),
        num_problems_to_gen: 2,
        problem_gen_model: "gpt4o".to_string(),
        count_policy: CountPolicy::Reject,
    };
    let list = ProblemGenerator::new(llm.clone(), 10)
        .generate(repo.path(), &pairs(), &params)
        .await
        .unwrap();
    generation.assert();
    assert_eq!(list.problem_statements.len(), 2);
    assert_eq!(list.prompt_tokens, 2000);
    let first = &list.problem_statements[0];
    assert_eq!(first.model, "gpt-4o");
    assert!(first.prompt.contains("File: routes.py"));
    assert!(!first.prompt.contains("docs/index.md"));

    // Evaluation
    let weights = ScoringWeights::with_judgment_weight(0.1, 0.4, 0.2, 0.0);
    let grader = Grader::new(
        llm,
        GraderConfig::default(),
        ScoreCalculator::new(weights).unwrap(),
    );
    let evaluator = Evaluator::new(
        Arc::new(PatchingAgent),
        Arc::new(FixedTests),
        grader,
        EvaluatorConfig {
            miner_model: "gpt-4o-mini".to_string(),
            agent_timeout_secs: 10,
            tests_timeout_secs: 10,
        },
    );
    let outcomes = evaluator
        .run_batch("acme/blueprints", list.problem_statements)
        .await;

    sanitizer.assert_hits(1);
    grading.assert_hits(1);
    assert_eq!(outcomes.len(), 2);
    let scored = outcomes[0].result.as_ref().unwrap();
    // 3 judgments + half the checklist + full test signal
    let expected = 0.3 + 0.2 + 0.2;
    assert!((scored.miner_output_score().unwrap().total_score - expected).abs() < 1e-9);
    assert!(matches!(
        outcomes[1].result,
        Err(BenchError::AgentNotSubmitted { .. })
    ));

    // Log persistence
    let log_dir = tempfile::tempdir().unwrap();
    let log_path = log_dir.path().join("logs").join("evaluations.json");
    let mut log = EvaluationLog::load(&log_path).unwrap();
    assert!(log.is_empty());
    assert_eq!(record_outcomes(&mut log, "acme/blueprints", outcomes), 1);
    log.save(&log_path).unwrap();

    let reloaded = EvaluationLog::load(&log_path).unwrap();
    assert_eq!(reloaded, log);
    let summary = reloaded.summary();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].repo, "acme/blueprints");
    assert_eq!(summary[0].scored, 1);
    assert!((summary[0].mean_score.unwrap() - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_upstream_failure_is_not_retried() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(503).body("overloaded");
    });

    let llm = Arc::new(
        OpenAiClient::new(LlmConfig {
            api_base: server.base_url(),
            timeout_secs: 10,
            ..Default::default()
        })
        .unwrap(),
    );
    let params = ProblemGeneratorParameters {
        selection: FilePairSelection::First,
        template: Arc::new(FilesTemplate::default()),
        num_problems_to_gen: 1,
        problem_gen_model: "gpt-4o".to_string(),
        count_policy: CountPolicy::Reject,
    };

    let err = ProblemGenerator::new(llm, 10)
        .generate(Path::new("/repos/x"), &pairs(), &params)
        .await
        .unwrap_err();
    assert!(err.is_upstream());
    failing.assert_hits(1);
}
