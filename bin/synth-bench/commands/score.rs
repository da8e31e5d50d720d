//! Score command - combine a grading result with test results

use anyhow::{Context, Result};
use std::path::Path;
use synth_bench::marshal::{from_structured, from_validated, to_structured};
use synth_bench::problem::{MinerLLMEvaluation, MinerSolutionTestResults};
use synth_bench::scoring::ScoreCalculator;
use synth_bench::BenchConfig;

use super::read_json;
use crate::style::*;

pub fn run(
    config: &BenchConfig,
    evaluation: &Path,
    tests: &Path,
    patch: &Path,
    checklist_len: usize,
    json: bool,
) -> Result<()> {
    let evaluation: MinerLLMEvaluation =
        from_validated(&read_json(evaluation)?).context("Invalid evaluation")?;
    let test_results: MinerSolutionTestResults =
        from_structured(&read_json(tests)?).context("Invalid test results")?;
    let patch = std::fs::read_to_string(patch)
        .with_context(|| format!("Failed to read patch {}", patch.display()))?;

    let calculator = ScoreCalculator::new(config.scoring.clone())?;
    let breakdown = if patch.trim().is_empty() {
        None
    } else {
        Some(calculator.breakdown(&evaluation, checklist_len, &test_results)?)
    };
    let score = calculator.score(&patch, evaluation, checklist_len, test_results)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&to_structured(&score)?)?);
        return Ok(());
    }

    let max = calculator.weights().max_score();
    print_header("Patch Score");
    match breakdown {
        Some(b) => {
            print_section("Terms");
            print_key_value("Judgments", &format!("{:.4}", b.judgments));
            print_key_value("Checklist", &format!("{:.4}", b.checklist));
            print_key_value("Test delta", &format!("{:.4}", b.test_delta));
            print_key_value("Synthetic test", &format!("{:.4}", b.synthetic_test));
        }
        None => print_warning("Patch is empty"),
    }

    let fraction = if max > 0.0 { score.total_score / max } else { 0.0 };
    print_section("Total");
    print_key_value_colored(
        "Score",
        &format!("{:.4} / {:.4}", score.total_score, max),
        score_color(fraction),
    );
    println!("  {}", progress_bar(fraction, 40));
    println!();
    Ok(())
}
