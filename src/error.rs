//! Pipeline-level errors
//!
//! Marshalling, scoring and upstream failures keep their own types; this enum
//! is what the generation, grading and evaluation pipelines return.

use thiserror::Error;

use crate::llm_client::UpstreamError;
use crate::marshal::MarshalError;
use crate::scoring::ScoringError;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("requested {requested} problem statements, model returned {returned}")]
    GenerationCount { requested: usize, returned: usize },

    #[error("grading model returned no structured evaluation")]
    GradingRefused,

    #[error("no candidate file pairs to select from")]
    NoFilePairs,

    #[error("prompt template error: {0}")]
    Template(String),

    #[error("agent did not submit a patch (exit status `{exit_status}`)")]
    AgentNotSubmitted { exit_status: String },

    #[error("collaborator `{stage}` failed: {message}")]
    Collaborator { stage: &'static str, message: String },

    #[error("cannot attach a score before a solution")]
    ScoreBeforeSolution,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    /// Whether the failure came from an external collaborator rather than
    /// from local data. Callers decide whether to retry those.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            BenchError::Upstream(_)
                | BenchError::GradingRefused
                | BenchError::AgentNotSubmitted { .. }
                | BenchError::Collaborator { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
