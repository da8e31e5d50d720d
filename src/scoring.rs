//! Scoring system for miner solutions
//!
//! A score combines the grading model's four fixed judgments, the fraction of
//! the dynamic checklist the patch satisfies, a test-delta signal and the
//! synthetic test outcome. Every term is in `[0, 1]` before weighting, so a
//! score lies in `[0, ScoringWeights::max_score()]`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::problem::{MinerLLMEvaluation, MinerSolutionScore, MinerSolutionTestResults};

/// The fixed score of a patch with no content.
pub static EMPTY_PATCH_SCORE: Lazy<MinerSolutionScore> = Lazy::new(|| MinerSolutionScore {
    total_score: 0.0,
    llm_evaluation: MinerLLMEvaluation {
        addresses_problem_in_statement: false,
        logical_solution: false,
        brevity_and_cleanliness_of_code: false,
        no_new_bugs: false,
        dynamic_checklist_scores: vec![],
        explanation_of_scores: "Patch was empty".to_string(),
    },
    test_results: MinerSolutionTestResults {
        pass_previously: 0,
        pass_after: 0,
        fail_previously: 0,
        fail_after: 0,
        synthetic_test_passed: false,
    },
});

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("checklist has {expected} items but {actual} scores were graded")]
    ChecklistLength { expected: usize, actual: usize },

    #[error("invalid weight `{name}`: {value} (weights must be finite and non-negative)")]
    InvalidWeight { name: &'static str, value: f64 },
}

/// Weight of each score term.
///
/// Defaults sum to 1.0: 0.1 per judgment, 0.3 for the checklist, 0.2 for the
/// test delta and 0.1 for the synthetic test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub addresses_problem: f64,
    pub logical_solution: f64,
    pub brevity_and_cleanliness: f64,
    pub no_new_bugs: f64,
    pub checklist: f64,
    pub test_delta: f64,
    pub synthetic_test: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            addresses_problem: 0.1,
            logical_solution: 0.1,
            brevity_and_cleanliness: 0.1,
            no_new_bugs: 0.1,
            checklist: 0.3,
            test_delta: 0.2,
            synthetic_test: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Same weight for all four judgments.
    pub fn with_judgment_weight(
        judgment: f64,
        checklist: f64,
        test_delta: f64,
        synthetic_test: f64,
    ) -> Self {
        Self {
            addresses_problem: judgment,
            logical_solution: judgment,
            brevity_and_cleanliness: judgment,
            no_new_bugs: judgment,
            checklist,
            test_delta,
            synthetic_test,
        }
    }

    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("addresses_problem", self.addresses_problem),
            ("logical_solution", self.logical_solution),
            ("brevity_and_cleanliness", self.brevity_and_cleanliness),
            ("no_new_bugs", self.no_new_bugs),
            ("checklist", self.checklist),
            ("test_delta", self.test_delta),
            ("synthetic_test", self.synthetic_test),
        ]
    }

    /// Upper bound of any score under these weights.
    pub fn max_score(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }
}

/// Weighted contribution of each term to a score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub judgments: f64,
    pub checklist: f64,
    pub test_delta: f64,
    pub synthetic_test: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.judgments + self.checklist + self.test_delta + self.synthetic_test
    }
}

/// Score calculator for miner solutions
#[derive(Debug, Clone, Default)]
pub struct ScoreCalculator {
    weights: ScoringWeights,
}

impl ScoreCalculator {
    /// Create a calculator with custom weights
    pub fn new(weights: ScoringWeights) -> Result<Self, ScoringError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a graded patch.
    ///
    /// A blank patch returns [`EMPTY_PATCH_SCORE`] before anything else is
    /// looked at, whatever the weights.
    pub fn score(
        &self,
        patch: &str,
        llm_evaluation: MinerLLMEvaluation,
        checklist_len: usize,
        test_results: MinerSolutionTestResults,
    ) -> Result<MinerSolutionScore, ScoringError> {
        if patch.trim().is_empty() {
            debug!("Empty patch, using the empty patch score");
            return Ok(EMPTY_PATCH_SCORE.clone());
        }

        let breakdown = self.breakdown(&llm_evaluation, checklist_len, &test_results)?;
        let total_score = breakdown.total().max(0.0);

        debug!(
            "Scored patch: total={:.4} (judgments={:.4}, checklist={:.4}, tests={:.4}, synthetic={:.4})",
            total_score,
            breakdown.judgments,
            breakdown.checklist,
            breakdown.test_delta,
            breakdown.synthetic_test
        );

        Ok(MinerSolutionScore {
            total_score,
            llm_evaluation,
            test_results,
        })
    }

    /// Per-term contributions, after checking the checklist length.
    pub fn breakdown(
        &self,
        llm_evaluation: &MinerLLMEvaluation,
        checklist_len: usize,
        test_results: &MinerSolutionTestResults,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let graded = llm_evaluation.dynamic_checklist_scores.len();
        if graded != checklist_len {
            return Err(ScoringError::ChecklistLength {
                expected: checklist_len,
                actual: graded,
            });
        }

        let w = &self.weights;
        let judgment_weights = [
            w.addresses_problem,
            w.logical_solution,
            w.brevity_and_cleanliness,
            w.no_new_bugs,
        ];
        let judgments: f64 = llm_evaluation
            .judgments()
            .iter()
            .zip(judgment_weights)
            .filter(|(passed, _)| **passed)
            .map(|(_, weight)| weight)
            .sum();

        Ok(ScoreBreakdown {
            judgments,
            checklist: w.checklist * checklist_fraction(llm_evaluation),
            test_delta: w.test_delta * test_delta_signal(test_results),
            synthetic_test: if test_results.synthetic_test_passed {
                w.synthetic_test
            } else {
                0.0
            },
        })
    }
}

/// Fraction of checklist items satisfied; an empty checklist earns nothing.
pub fn checklist_fraction(llm_evaluation: &MinerLLMEvaluation) -> f64 {
    let total = llm_evaluation.dynamic_checklist_scores.len();
    if total == 0 {
        return 0.0;
    }
    llm_evaluation.satisfied_checklist_items() as f64 / total as f64
}

/// Test-delta signal in `[0, 1]`.
///
/// A patch that leaves fewer tests passing than before earns 0, however many
/// failures it fixes. Otherwise gains are newly passing tests and fixed
/// failures, losses are new failures; a net change that is not positive earns
/// 0 and anything else is the share of gains among all movements.
pub fn test_delta_signal(results: &MinerSolutionTestResults) -> f64 {
    let pass_delta = results.pass_delta();
    if pass_delta < 0 {
        return 0.0;
    }

    let fail_delta = results.fail_delta();
    if pass_delta + fail_delta <= 0 {
        return 0.0;
    }

    let gains = pass_delta + fail_delta.max(0);
    let losses = (-fail_delta).max(0);
    gains as f64 / (gains + losses) as f64
}
