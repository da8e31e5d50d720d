//! Benchmark records
//!
//! Plain records are declared against the marshalling engine; records that are
//! also requested as LLM structured output (or produced by the agent runtime)
//! are validated records and carry serde derives instead.

use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::BenchError;
use crate::marshal::{
    FieldReader, FieldWriter, MarshalError, PlainRecord, RecordType, TypeDecl, ValidatedRecord,
};

// ============================================================================
// INGESTION
// ============================================================================

/// Thresholds handed to the repository ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionHeuristics {
    pub min_files_to_consider_dir_for_problems: u64,
    pub min_file_content_len: u64,
}

impl PlainRecord for IngestionHeuristics {
    const NAME: &'static str = "IngestionHeuristics";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("min_files_to_consider_dir_for_problems", TypeDecl::uint()),
            ("min_file_content_len", TypeDecl::uint()),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<IngestionHeuristics>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            min_files_to_consider_dir_for_problems: fields
                .uint("min_files_to_consider_dir_for_problems")?,
            min_file_content_len: fields.uint("min_file_content_len")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .uint(
                "min_files_to_consider_dir_for_problems",
                self.min_files_to_consider_dir_for_problems,
            )
            .uint("min_file_content_len", self.min_file_content_len);
    }
}

/// A source file with its embedding.
#[derive(Clone, PartialEq)]
pub struct EmbeddedFile {
    pub path: String,
    pub contents: String,
    pub embedding: Vec<f64>,
}

impl fmt::Debug for EmbeddedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File: {}, Length: {}", self.path, self.contents.len())
    }
}

impl PlainRecord for EmbeddedFile {
    const NAME: &'static str = "EmbeddedFile";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("path", TypeDecl::string()),
            ("contents", TypeDecl::string()),
            ("embedding", TypeDecl::seq(TypeDecl::float())),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<EmbeddedFile>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            path: fields.string("path")?,
            contents: fields.string("contents")?,
            embedding: fields.floats("embedding")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .string("path", &self.path)
            .string("contents", &self.contents)
            .floats("embedding", &self.embedding);
    }
}

/// Two related files and their cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePair {
    pub cosine_similarity: f64,
    pub files: Vec<EmbeddedFile>,
}

impl PlainRecord for FilePair {
    const NAME: &'static str = "FilePair";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("cosine_similarity", TypeDecl::float()),
            ("files", TypeDecl::seq(TypeDecl::plain::<EmbeddedFile>())),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<FilePair>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        let cosine_similarity = fields.float("cosine_similarity")?;
        if !(-1.0..=1.0).contains(&cosine_similarity) {
            return Err(MarshalError::Validation {
                field: "cosine_similarity".to_string(),
                record: Self::NAME.to_string(),
                message: format!("{} is outside [-1, 1]", cosine_similarity),
            });
        }
        Ok(Self {
            cosine_similarity,
            files: fields.records("files")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .float("cosine_similarity", self.cosine_similarity)
            .records("files", &self.files);
    }
}

// ============================================================================
// GENERATION
// ============================================================================

/// Token usage and cost of the validator-side generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorModelStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl PlainRecord for ValidatorModelStats {
    const NAME: &'static str = "ValidatorModelStats";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("input_tokens", TypeDecl::uint()),
            ("output_tokens", TypeDecl::uint()),
            ("cost", TypeDecl::float()),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<ValidatorModelStats>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            input_tokens: fields.uint("input_tokens")?,
            output_tokens: fields.uint("output_tokens")?,
            cost: fields.float("cost")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .uint("input_tokens", self.input_tokens)
            .uint("output_tokens", self.output_tokens)
            .float("cost", self.cost);
    }
}

/// A synthetic issue generated from a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProblemStatement {
    pub repo_path: PathBuf,
    /// The rendered generation prompt; doubles as the affected-files context
    /// when grading.
    pub prompt: String,
    pub model: String,
    pub problem_statement: String,
    pub dynamic_checklist: Vec<String>,
    pub model_stats: Option<ValidatorModelStats>,
}

impl PlainRecord for GeneratedProblemStatement {
    const NAME: &'static str = "GeneratedProblemStatement";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("repo_path", TypeDecl::path()),
            ("prompt", TypeDecl::string()),
            ("model", TypeDecl::string()),
            ("problem_statement", TypeDecl::string()),
            ("dynamic_checklist", TypeDecl::seq(TypeDecl::string())),
            (
                "model_stats",
                TypeDecl::optional(TypeDecl::plain::<ValidatorModelStats>()),
            ),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<GeneratedProblemStatement>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            repo_path: fields.path("repo_path")?,
            prompt: fields.string("prompt")?,
            model: fields.string("model")?,
            problem_statement: fields.string("problem_statement")?,
            dynamic_checklist: fields.strings("dynamic_checklist")?,
            model_stats: fields.optional_record("model_stats")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .path("repo_path", &self.repo_path)
            .string("prompt", &self.prompt)
            .string("model", &self.model)
            .string("problem_statement", &self.problem_statement)
            .strings("dynamic_checklist", &self.dynamic_checklist)
            .optional_record("model_stats", self.model_stats.as_ref());
    }
}

/// One generation call's statements with the call's token usage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProblemStatementList {
    pub problem_statements: Vec<GeneratedProblemStatement>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl PlainRecord for GeneratedProblemStatementList {
    const NAME: &'static str = "GeneratedProblemStatementList";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            (
                "problem_statements",
                TypeDecl::seq(TypeDecl::plain::<GeneratedProblemStatement>()),
            ),
            ("prompt_tokens", TypeDecl::uint()),
            ("completion_tokens", TypeDecl::uint()),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<GeneratedProblemStatementList>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            problem_statements: fields.records("problem_statements")?,
            prompt_tokens: fields.uint("prompt_tokens")?,
            completion_tokens: fields.uint("completion_tokens")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .records("problem_statements", &self.problem_statements)
            .uint("prompt_tokens", self.prompt_tokens)
            .uint("completion_tokens", self.completion_tokens);
    }
}

/// A single problem as the generation model returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedProblem {
    pub problem_statement: String,
    pub dynamic_checklist: Vec<String>,
}

impl ValidatedRecord for GeneratedProblem {
    const NAME: &'static str = "GeneratedProblem";
}

/// Response schema of the generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListOfGeneratedProblems {
    pub generated_problem_statements: Vec<GeneratedProblem>,
}

impl ValidatedRecord for ListOfGeneratedProblems {
    const NAME: &'static str = "ListOfGeneratedProblems";
}

// ============================================================================
// SOLVING
// ============================================================================

/// Input handed to the agent-execution collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsolvedIssue {
    pub desc: String,
    pub local_code_path: PathBuf,
}

impl PlainRecord for UnsolvedIssue {
    const NAME: &'static str = "UnsolvedIssue";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![("desc", TypeDecl::string()), ("local_code_path", TypeDecl::path())]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<UnsolvedIssue>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            desc: fields.string("desc")?,
            local_code_path: fields.path("local_code_path")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .string("desc", &self.desc)
            .path("local_code_path", &self.local_code_path);
    }
}

/// Cost statistics reported by the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MinerModelStats {
    pub api_calls: u64,
    pub instance_cost: f64,
    pub tokens_received: u64,
    pub tokens_sent: u64,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
}

impl ValidatedRecord for MinerModelStats {
    const NAME: &'static str = "MinerModelStats";
}

/// A miner's patch.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSolution {
    pub patch: String,
    pub model_stats: Option<MinerModelStats>,
}

impl IssueSolution {
    pub fn new(patch: impl Into<String>) -> Self {
        Self {
            patch: patch.into(),
            model_stats: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patch.trim().is_empty()
    }
}

impl PlainRecord for IssueSolution {
    const NAME: &'static str = "IssueSolution";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("patch", TypeDecl::string()),
            (
                "model_stats",
                TypeDecl::optional(TypeDecl::validated::<MinerModelStats>()),
            ),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<IssueSolution>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            patch: fields.string("patch")?,
            model_stats: fields.optional_validated("model_stats")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .string("patch", &self.patch)
            .optional_validated("model_stats", self.model_stats.as_ref());
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// The grading model's judgment of a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MinerLLMEvaluation {
    pub addresses_problem_in_statement: bool,
    pub logical_solution: bool,
    pub brevity_and_cleanliness_of_code: bool,
    /// True when the patch introduces no new bugs.
    pub no_new_bugs: bool,
    /// One entry per checklist item, in checklist order.
    pub dynamic_checklist_scores: Vec<bool>,
    pub explanation_of_scores: String,
}

impl MinerLLMEvaluation {
    pub fn judgments(&self) -> [bool; 4] {
        [
            self.addresses_problem_in_statement,
            self.logical_solution,
            self.brevity_and_cleanliness_of_code,
            self.no_new_bugs,
        ]
    }

    pub fn satisfied_checklist_items(&self) -> usize {
        self.dynamic_checklist_scores.iter().filter(|s| **s).count()
    }
}

impl ValidatedRecord for MinerLLMEvaluation {
    const NAME: &'static str = "MinerLLMEvaluation";
}

/// Test counts before and after applying the patch.
///
/// The counts are bookkeeping only: tests may be added or removed between the
/// two runs, so pass + fail need not agree across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinerSolutionTestResults {
    pub pass_previously: u64,
    pub pass_after: u64,
    pub fail_previously: u64,
    pub fail_after: u64,
    pub synthetic_test_passed: bool,
}

impl MinerSolutionTestResults {
    /// `pass_after - pass_previously`, exact for any pair of counts.
    pub fn pass_delta(&self) -> i128 {
        i128::from(self.pass_after) - i128::from(self.pass_previously)
    }

    /// `fail_previously - fail_after`, exact for any pair of counts.
    pub fn fail_delta(&self) -> i128 {
        i128::from(self.fail_previously) - i128::from(self.fail_after)
    }
}

impl PlainRecord for MinerSolutionTestResults {
    const NAME: &'static str = "MinerSolutionTestResults";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("pass_previously", TypeDecl::uint()),
            ("pass_after", TypeDecl::uint()),
            ("fail_previously", TypeDecl::uint()),
            ("fail_after", TypeDecl::uint()),
            ("synthetic_test_passed", TypeDecl::bool()),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<MinerSolutionTestResults>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        Ok(Self {
            pass_previously: fields.uint("pass_previously")?,
            pass_after: fields.uint("pass_after")?,
            fail_previously: fields.uint("fail_previously")?,
            fail_after: fields.uint("fail_after")?,
            synthetic_test_passed: fields.bool("synthetic_test_passed")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .uint("pass_previously", self.pass_previously)
            .uint("pass_after", self.pass_after)
            .uint("fail_previously", self.fail_previously)
            .uint("fail_after", self.fail_after)
            .bool("synthetic_test_passed", self.synthetic_test_passed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinerSolutionScore {
    pub total_score: f64,
    pub llm_evaluation: MinerLLMEvaluation,
    pub test_results: MinerSolutionTestResults,
}

impl PlainRecord for MinerSolutionScore {
    const NAME: &'static str = "MinerSolutionScore";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("total_score", TypeDecl::float()),
            (
                "llm_evaluation",
                TypeDecl::validated::<MinerLLMEvaluation>(),
            ),
            (
                "test_results",
                TypeDecl::plain::<MinerSolutionTestResults>(),
            ),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<MinerSolutionScore>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        let total_score = fields.float("total_score")?;
        if total_score < 0.0 {
            return Err(MarshalError::Validation {
                field: "total_score".to_string(),
                record: Self::NAME.to_string(),
                message: format!("negative score {}", total_score),
            });
        }
        Ok(Self {
            total_score,
            llm_evaluation: fields.validated("llm_evaluation")?,
            test_results: fields.record("test_results")?,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .float("total_score", self.total_score)
            .validated("llm_evaluation", &self.llm_evaluation)
            .record("test_results", &self.test_results);
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One problem's journey through the benchmark.
///
/// Built with the required fields, then filled in as the pipeline advances:
/// the solution first, the score after it.
#[derive(Debug, Clone, PartialEq)]
pub struct FullyScoredProblem {
    /// e.g. "pytest-dev/pytest"
    pub repo: String,
    pub generated_problem_statement: GeneratedProblemStatement,
    pub miner_llm: String,
    pub time_to_solve_s: f64,
    miner_solution: Option<IssueSolution>,
    miner_output_score: Option<MinerSolutionScore>,
}

impl FullyScoredProblem {
    pub fn new(
        repo: impl Into<String>,
        generated_problem_statement: GeneratedProblemStatement,
        miner_llm: impl Into<String>,
        time_to_solve_s: f64,
    ) -> Self {
        Self {
            repo: repo.into(),
            generated_problem_statement,
            miner_llm: miner_llm.into(),
            time_to_solve_s,
            miner_solution: None,
            miner_output_score: None,
        }
    }

    pub fn miner_solution(&self) -> Option<&IssueSolution> {
        self.miner_solution.as_ref()
    }

    pub fn miner_output_score(&self) -> Option<&MinerSolutionScore> {
        self.miner_output_score.as_ref()
    }

    pub fn attach_solution(&mut self, solution: IssueSolution) {
        self.miner_solution = Some(solution);
    }

    pub fn attach_score(&mut self, score: MinerSolutionScore) -> Result<(), BenchError> {
        if self.miner_solution.is_none() {
            return Err(BenchError::ScoreBeforeSolution);
        }
        self.miner_output_score = Some(score);
        Ok(())
    }

    pub fn is_scored(&self) -> bool {
        self.miner_output_score.is_some()
    }
}

impl PlainRecord for FullyScoredProblem {
    const NAME: &'static str = "FullyScoredProblem";

    fn fields() -> Vec<(&'static str, TypeDecl)> {
        vec![
            ("repo", TypeDecl::string()),
            (
                "generated_problem_statement",
                TypeDecl::plain::<GeneratedProblemStatement>(),
            ),
            ("miner_llm", TypeDecl::string()),
            ("time_to_solve_s", TypeDecl::float()),
            (
                "miner_solution",
                TypeDecl::optional(TypeDecl::plain::<IssueSolution>()),
            ),
            (
                "miner_output_score",
                TypeDecl::optional(TypeDecl::plain::<MinerSolutionScore>()),
            ),
        ]
    }

    fn record_type() -> Result<&'static RecordType, MarshalError> {
        static TYPE: OnceCell<RecordType> = OnceCell::new();
        RecordType::registered::<FullyScoredProblem>(&TYPE)
    }

    fn decode(fields: &FieldReader<'_>) -> Result<Self, MarshalError> {
        let miner_solution: Option<IssueSolution> = fields.optional_record("miner_solution")?;
        let miner_output_score: Option<MinerSolutionScore> =
            fields.optional_record("miner_output_score")?;

        if miner_output_score.is_some() && miner_solution.is_none() {
            return Err(MarshalError::Validation {
                field: "miner_output_score".to_string(),
                record: Self::NAME.to_string(),
                message: "score present without a solution".to_string(),
            });
        }

        Ok(Self {
            repo: fields.string("repo")?,
            generated_problem_statement: fields.record("generated_problem_statement")?,
            miner_llm: fields.string("miner_llm")?,
            time_to_solve_s: fields.float("time_to_solve_s")?,
            miner_solution,
            miner_output_score,
        })
    }

    fn encode(&self, fields: &mut FieldWriter) {
        fields
            .string("repo", &self.repo)
            .record("generated_problem_statement", &self.generated_problem_statement)
            .string("miner_llm", &self.miner_llm)
            .float("time_to_solve_s", self.time_to_solve_s)
            .optional_record("miner_solution", self.miner_solution.as_ref())
            .optional_record("miner_output_score", self.miner_output_score.as_ref());
    }
}
