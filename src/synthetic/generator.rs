//! Problem statement generator
//!
//! Picks a file pair, renders the generation prompt from it and asks the
//! generation model for a fixed number of problem statements in one
//! schema-constrained call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::template::PromptTemplate;
use crate::error::BenchError;
use crate::llm_client::{LanguageModel, Message, ResponseSchema, UpstreamError};
use crate::marshal::from_validated;
use crate::pricing::calculate_price;
use crate::problem::{
    FilePair, GeneratedProblemStatement, GeneratedProblemStatementList, ListOfGeneratedProblems,
    ValidatorModelStats,
};
use crate::util::with_timeout;

/// Short names accepted for the generation model
const MODEL_ALIASES: &[(&str, &str)] = &[("gpt4omini", "gpt-4o-mini"), ("gpt4o", "gpt-4o")];

pub fn resolve_model_alias(model: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model)
        .map(|(_, resolved)| *resolved)
        .unwrap_or(model)
}

/// How a file pair is chosen from the candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilePairSelection {
    /// Highest cosine similarity; the first one wins ties
    #[default]
    MostSimilar,
    LeastSimilar,
    First,
}

impl FilePairSelection {
    pub fn select<'a>(&self, pairs: &'a [FilePair]) -> Option<&'a FilePair> {
        match self {
            Self::First => pairs.first(),
            Self::MostSimilar => pairs.iter().reduce(|best, p| {
                if p.cosine_similarity > best.cosine_similarity {
                    p
                } else {
                    best
                }
            }),
            Self::LeastSimilar => pairs.iter().reduce(|best, p| {
                if p.cosine_similarity < best.cosine_similarity {
                    p
                } else {
                    best
                }
            }),
        }
    }
}

impl FromStr for FilePairSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "most-similar" => Ok(Self::MostSimilar),
            "least-similar" => Ok(Self::LeastSimilar),
            "first" => Ok(Self::First),
            other => Err(format!(
                "unknown file pair selection '{}', expected most-similar, least-similar or first",
                other
            )),
        }
    }
}

/// What to do when the model returns a different number of statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountPolicy {
    /// Any mismatch is an error
    #[default]
    Reject,
    /// Keep the first N of a surplus; a shortfall is still an error
    Truncate,
}

impl fmt::Display for CountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Truncate => write!(f, "truncate"),
        }
    }
}

/// Parameters of one generation run
#[derive(Clone)]
pub struct ProblemGeneratorParameters {
    pub selection: FilePairSelection,
    pub template: Arc<dyn PromptTemplate>,
    pub num_problems_to_gen: usize,
    pub problem_gen_model: String,
    pub count_policy: CountPolicy,
}

impl fmt::Debug for ProblemGeneratorParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemGeneratorParameters")
            .field("selection", &self.selection)
            .field("num_problems_to_gen", &self.num_problems_to_gen)
            .field("problem_gen_model", &self.problem_gen_model)
            .field("count_policy", &self.count_policy)
            .finish_non_exhaustive()
    }
}

pub struct ProblemGenerator {
    llm: Arc<dyn LanguageModel>,
    llm_timeout_secs: u64,
}

impl ProblemGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, llm_timeout_secs: u64) -> Self {
        Self {
            llm,
            llm_timeout_secs,
        }
    }

    /// Generate problem statements for `repo_path` from one of `pairs`.
    ///
    /// Every returned statement carries the same prompt, model and usage.
    pub async fn generate(
        &self,
        repo_path: &Path,
        pairs: &[FilePair],
        params: &ProblemGeneratorParameters,
    ) -> Result<GeneratedProblemStatementList, BenchError> {
        let pair = params
            .selection
            .select(pairs)
            .ok_or(BenchError::NoFilePairs)?;
        debug!(
            "Selected file pair ({} files, similarity {:.3}) from {} candidates",
            pair.files.len(),
            pair.cosine_similarity,
            pairs.len()
        );

        let prompt = params.template.render(&pair.files)?;
        let model = resolve_model_alias(&params.problem_gen_model);

        info!(
            "Generating {} problem statements for {} with {}",
            params.num_problems_to_gen,
            repo_path.display(),
            model
        );

        let messages = [
            Message::system(prompt.clone()),
            Message::user(format!(
                "Generate the list of problem statements. Generate exactly {} statements, no more and no less",
                params.num_problems_to_gen
            )),
        ];
        let schema = ResponseSchema::of::<ListOfGeneratedProblems>();

        let completion = with_timeout(
            "llm",
            self.llm_timeout_secs,
            self.llm.complete(model, &messages, Some(&schema)),
        )
        .await??;

        let value = completion.structured().ok_or_else(|| {
            UpstreamError::Refusal("generation model returned free text".to_string())
        })?;
        let mut generated = from_validated::<ListOfGeneratedProblems>(value)?.generated_problem_statements;

        let requested = params.num_problems_to_gen;
        let returned = generated.len();
        if returned != requested {
            match params.count_policy {
                CountPolicy::Truncate if returned > requested => {
                    warn!(
                        "Model returned {} statements, keeping the first {}",
                        returned, requested
                    );
                    generated.truncate(requested);
                }
                _ => return Err(BenchError::GenerationCount { requested, returned }),
            }
        }

        let usage = completion.usage;
        let stats = ValidatorModelStats {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost: calculate_price(model, usage.prompt_tokens, usage.completion_tokens),
        };

        info!(
            "Generated {} problem statements ({} prompt / {} completion tokens, ${:.4})",
            generated.len(),
            usage.prompt_tokens,
            usage.completion_tokens,
            stats.cost
        );

        let problem_statements = generated
            .into_iter()
            .map(|problem| GeneratedProblemStatement {
                repo_path: repo_path.to_path_buf(),
                prompt: prompt.clone(),
                model: model.to_string(),
                problem_statement: problem.problem_statement,
                dynamic_checklist: problem.dynamic_checklist,
                model_stats: Some(stats.clone()),
            })
            .collect();

        Ok(GeneratedProblemStatementList {
            problem_statements,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}
