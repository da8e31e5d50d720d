//! Evaluate command - run the agent on generated problems and log the scores

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use synth_bench::bench::{CommandAgent, CommandTestRunner};
use synth_bench::evaluation::record_outcomes;
use synth_bench::llm_client::OpenAiClient;
use synth_bench::marshal::from_structured;
use synth_bench::problem::GeneratedProblemStatementList;
use synth_bench::{BenchConfig, EvaluationLog, Evaluator, Grader, ScoreCalculator};

use super::read_json;
use crate::style::*;

pub async fn run(
    config: BenchConfig,
    repo: &Path,
    repo_name: &str,
    problems: &Path,
    log_path: &Path,
) -> Result<()> {
    if !config.agent.command().is_configured() {
        bail!("No agent command configured ([agent] program)");
    }
    if !config.tests.is_configured() {
        bail!("No test runner configured ([tests] program)");
    }

    let list: GeneratedProblemStatementList = from_structured(&read_json(problems)?)
        .with_context(|| format!("Invalid problem statements in {}", problems.display()))?;

    // Problems run against this checkout, wherever they were generated.
    let statements = list
        .problem_statements
        .into_iter()
        .map(|mut s| {
            s.repo_path = repo.to_path_buf();
            s
        })
        .collect::<Vec<_>>();

    let llm = Arc::new(OpenAiClient::new(config.llm.clone())?);
    let grader = Grader::new(
        llm,
        config.grader_config(),
        ScoreCalculator::new(config.scoring.clone())?,
    );
    let evaluator = Evaluator::new(
        Arc::new(CommandAgent::new(config.agent.command())),
        Arc::new(CommandTestRunner::new(config.tests.clone())),
        grader,
        config.evaluator_config(),
    );

    print_header(&format!("Evaluating {}", repo_name));
    print_info(&format!(
        "{} problems, agent model {}",
        statements.len(),
        config.agent.miner_model
    ));

    let outcomes = evaluator.run_batch(repo_name, statements).await;

    print_section("Results");
    for (i, outcome) in outcomes.iter().enumerate() {
        let label = format!("[{}] {}", i + 1, synth_bench::util::truncate(&outcome.problem_statement, 60));
        match &outcome.result {
            Ok(problem) => {
                let score = problem
                    .miner_output_score()
                    .map(|s| s.total_score)
                    .unwrap_or(0.0);
                println!("  {} {} {:.4}", icon_success(), label, score);
            }
            Err(e) => println!("  {} {} {}", icon_error(), label, style_dim(&e.to_string())),
        }
    }
    println!();

    let mut log = EvaluationLog::load(log_path)?;
    let recorded = record_outcomes(&mut log, repo_name, outcomes);
    log.save(log_path)?;
    print_success(&format!(
        "Recorded {} scored problems in {}",
        recorded,
        log_path.display()
    ));
    Ok(())
}
