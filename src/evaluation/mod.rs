//! Evaluation pipeline

pub mod evaluator;
pub mod grader;

pub use evaluator::{record_outcomes, Evaluator, EvaluatorConfig, ProblemOutcome};
pub use grader::{
    grading_context, injection_markers, Grader, GraderConfig, DEFAULT_GRADER_PROMPT,
    SANITIZER_PROMPT,
};
