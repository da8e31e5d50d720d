//! Inspect command - per-repository summary of an evaluation log

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use std::path::Path;
use synth_bench::EvaluationLog;

use crate::style::*;

pub fn run(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Evaluation log not found: {}", path.display());
    }
    let log = EvaluationLog::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    print_header("Evaluation Log");
    print_key_value("File", &path.display().to_string());
    print_key_value("Runs", &log.runs().len().to_string());
    print_key_value("Problems", &log.problems().count().to_string());
    println!();

    if log.is_empty() {
        print_warning("Log has no problems");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Repository",
            "Problems",
            "Solved",
            "Scored",
            "Mean score",
            "Mean time (s)",
        ]);

    for summary in log.summary() {
        let score_cell = match summary.mean_score {
            Some(score) => {
                let color = if score >= 0.7 {
                    Color::Green
                } else if score >= 0.4 {
                    Color::Yellow
                } else {
                    Color::Red
                };
                Cell::new(format!("{:.4}", score)).fg(color)
            }
            None => Cell::new("-"),
        };
        table.add_row(vec![
            Cell::new(&summary.repo),
            Cell::new(summary.problems),
            Cell::new(summary.solved),
            Cell::new(summary.scored),
            score_cell,
            Cell::new(format!("{:.1}", summary.mean_time_to_solve_s)),
        ]);
    }

    println!("{table}");
    Ok(())
}
