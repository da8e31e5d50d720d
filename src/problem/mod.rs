//! Problem records and the evaluation log

mod log;
mod types;

pub use log::{EvaluationLog, EvaluationRun, RepoSummary};
pub use types::{
    EmbeddedFile, FilePair, FullyScoredProblem, GeneratedProblem, GeneratedProblemStatement,
    GeneratedProblemStatementList, IngestionHeuristics, IssueSolution, ListOfGeneratedProblems,
    MinerLLMEvaluation, MinerModelStats, MinerSolutionScore, MinerSolutionTestResults,
    UnsolvedIssue, ValidatorModelStats,
};

use crate::marshal::{MarshalError, PlainRecord};

fn check<T: PlainRecord>() -> Result<(), MarshalError> {
    T::record_type().map(|_| ())
}

/// Register every plain record schema, reporting the first authoring error.
///
/// Run once at startup so a bad declaration surfaces before any conversion.
pub fn register_schemas() -> Result<(), MarshalError> {
    check::<IngestionHeuristics>()?;
    check::<EmbeddedFile>()?;
    check::<FilePair>()?;
    check::<ValidatorModelStats>()?;
    check::<GeneratedProblemStatement>()?;
    check::<GeneratedProblemStatementList>()?;
    check::<UnsolvedIssue>()?;
    check::<IssueSolution>()?;
    check::<MinerSolutionTestResults>()?;
    check::<MinerSolutionScore>()?;
    check::<FullyScoredProblem>()?;
    Ok(())
}
