//! Persisted evaluation log
//!
//! On disk the log is a JSON sequence of mappings from repository name to the
//! scored problems of that repository. Every problem is read and written
//! through the marshalling engine.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use super::types::FullyScoredProblem;
use crate::error::BenchError;
use crate::marshal::{from_structured, to_structured, MarshalError};

const RECORD: &str = "EvaluationLog";

/// One evaluation run: repository name to its problems, in insertion order.
pub type EvaluationRun = IndexMap<String, Vec<FullyScoredProblem>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationLog {
    runs: Vec<EvaluationRun>,
}

/// Per-repository aggregate used for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSummary {
    pub repo: String,
    pub problems: usize,
    pub solved: usize,
    pub scored: usize,
    pub mean_score: Option<f64>,
    pub mean_time_to_solve_s: f64,
}

impl EvaluationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[EvaluationRun] {
        &self.runs
    }

    pub fn push_run(&mut self, run: EvaluationRun) {
        self.runs.push(run);
    }

    /// Append a run holding a single repository.
    pub fn record(&mut self, repo: impl Into<String>, problems: Vec<FullyScoredProblem>) {
        let mut run = EvaluationRun::new();
        run.insert(repo.into(), problems);
        self.runs.push(run);
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.values().all(Vec::is_empty))
    }

    /// Every problem with the repository it was logged under.
    pub fn problems(&self) -> impl Iterator<Item = (&str, &FullyScoredProblem)> {
        self.runs.iter().flat_map(|run| {
            run.iter()
                .flat_map(|(repo, problems)| problems.iter().map(move |p| (repo.as_str(), p)))
        })
    }

    pub fn to_structured(&self) -> Result<Value, MarshalError> {
        let mut runs = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            let mut map = Map::new();
            for (repo, problems) in run {
                let items = problems
                    .iter()
                    .map(to_structured::<FullyScoredProblem>)
                    .collect::<Result<Vec<_>, _>>()?;
                map.insert(repo.clone(), Value::Array(items));
            }
            runs.push(Value::Object(map));
        }
        Ok(Value::Array(runs))
    }

    pub fn from_structured(value: &Value) -> Result<Self, MarshalError> {
        let runs = value
            .as_array()
            .ok_or_else(|| MarshalError::mismatch(RECORD, "<root>", "sequence of runs", value))?;

        let mut log = Self::new();
        for (i, run) in runs.iter().enumerate() {
            let map = run.as_object().ok_or_else(|| {
                MarshalError::mismatch(RECORD, &format!("[{}]", i), "mapping of repositories", run)
            })?;

            let mut parsed = EvaluationRun::new();
            for (repo, problems) in map {
                let items = problems.as_array().ok_or_else(|| {
                    MarshalError::mismatch(
                        RECORD,
                        &format!("[{}].{}", i, repo),
                        "sequence of FullyScoredProblem",
                        problems,
                    )
                })?;
                let problems = items
                    .iter()
                    .map(from_structured::<FullyScoredProblem>)
                    .collect::<Result<Vec<_>, _>>()?;
                parsed.insert(repo.clone(), problems);
            }
            log.runs.push(parsed);
        }
        Ok(log)
    }

    /// Load a log; a missing file is an empty log.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        if !path.exists() {
            debug!("No evaluation log at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        let log = Self::from_structured(&value)?;
        info!(
            "Loaded evaluation log {} ({} runs, {} problems)",
            path.display(),
            log.runs.len(),
            log.problems().count()
        );
        Ok(log)
    }

    pub fn save(&self, path: &Path) -> Result<(), BenchError> {
        let value = self.to_structured()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
        info!("Saved evaluation log to {}", path.display());
        Ok(())
    }

    /// Aggregate per repository across all runs, in first-seen order.
    pub fn summary(&self) -> Vec<RepoSummary> {
        let mut by_repo: IndexMap<&str, Vec<&FullyScoredProblem>> = IndexMap::new();
        for (repo, problem) in self.problems() {
            by_repo.entry(repo).or_default().push(problem);
        }

        by_repo
            .into_iter()
            .map(|(repo, problems)| {
                let scores: Vec<f64> = problems
                    .iter()
                    .filter_map(|p| p.miner_output_score().map(|s| s.total_score))
                    .collect();
                let total_time: f64 = problems.iter().map(|p| p.time_to_solve_s).sum();

                RepoSummary {
                    repo: repo.to_string(),
                    problems: problems.len(),
                    solved: problems.iter().filter(|p| p.miner_solution().is_some()).count(),
                    scored: scores.len(),
                    mean_score: if scores.is_empty() {
                        None
                    } else {
                        Some(scores.iter().sum::<f64>() / scores.len() as f64)
                    },
                    mean_time_to_solve_s: if problems.is_empty() {
                        0.0
                    } else {
                        total_time / problems.len() as f64
                    },
                }
            })
            .collect()
    }
}
