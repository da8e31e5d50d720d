//! Synthetic issue benchmark for coding agents
//!
//! Problems are generated from a repository's related files, solved by a
//! coding agent, and scored from LLM judgments plus test results.
//!
//! ## Module Structure
//!
//! - `marshal/`: conversion between structured values and typed records
//! - `problem/`: benchmark records and the persisted evaluation log
//! - `scoring`: weighted score aggregation
//! - `synthetic/`: problem statement generation
//! - `evaluation/`: patch grading and the per-problem evaluator
//! - `bench/`: agent and test-runner collaborators
//! - `llm_client`: language model interface and OpenAI-compatible client

// ============================================================================
// CORE
// ============================================================================

/// Structural marshalling engine
pub mod marshal;

/// Benchmark records
pub mod problem;

/// Score aggregation
pub mod scoring;

// ============================================================================
// PIPELINES
// ============================================================================

/// Problem generation
pub mod synthetic;

/// Grading and evaluation
pub mod evaluation;

/// Agent and test execution
pub mod bench;

// ============================================================================
// AMBIENT
// ============================================================================

pub mod config;
pub mod error;
pub mod llm_client;
pub mod pricing;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use evaluation::{Evaluator, Grader};
pub use marshal::{from_structured, to_structured, MarshalError, StructuredValue};
pub use problem::{
    register_schemas, EvaluationLog, FullyScoredProblem, GeneratedProblemStatement,
    IssueSolution, MinerLLMEvaluation, MinerSolutionScore, MinerSolutionTestResults,
};
pub use scoring::{ScoreCalculator, ScoringWeights, EMPTY_PATCH_SCORE};
pub use synthetic::{ProblemGenerator, ProblemGeneratorParameters};
