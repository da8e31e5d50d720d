//! Benchmark Configuration
//!
//! Loaded from a TOML file, then overridden from the environment:
//! - `SYNTH_BENCH_API_BASE`: LLM API base URL
//! - `OPENAI_API_KEY`: LLM API key
//! - `SYNTH_BENCH_GEN_MODEL`: problem generation model
//! - `SYNTH_BENCH_NUM_PROBLEMS`: problems generated per run
//! - `SYNTH_BENCH_GRADER_MODEL`: grading model

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bench::CommandSpec;
use crate::error::BenchError;
use crate::evaluation::{EvaluatorConfig, GraderConfig, DEFAULT_GRADER_PROMPT};
use crate::llm_client::LlmConfig;
use crate::scoring::ScoringWeights;
use crate::synthetic::{CountPolicy, FilePairSelection, ProblemGeneratorParameters, PromptTemplate};

/// Complete benchmark configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub grading: GradingConfig,
    pub scoring: ScoringWeights,
    pub timeouts: TimeoutConfig,
    pub agent: AgentConfig,
    pub tests: CommandSpec,
}

/// Problem generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub num_problems: usize,
    pub count_policy: CountPolicy,
    pub selection: FilePairSelection,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-2024-08-06".to_string(),
            num_problems: 3,
            count_policy: CountPolicy::Reject,
            selection: FilePairSelection::MostSimilar,
        }
    }
}

/// Grading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub sanitizer_model: String,
    pub grader_model: String,
    pub grader_system_prompt: String,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            sanitizer_model: "gpt-4".to_string(),
            grader_model: "gpt-4o-2024-08-06".to_string(),
            grader_system_prompt: DEFAULT_GRADER_PROMPT.to_string(),
        }
    }
}

/// Deadlines of the external calls, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub llm_secs: u64,
    pub agent_secs: u64,
    pub tests_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: 300,    // 5 minutes per model call
            agent_secs: 1800, // 30 minutes per problem
            tests_secs: 600,
        }
    }
}

/// Agent command and the model it solves with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub miner_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            miner_model: "gpt-4o".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn command(&self) -> CommandSpec {
        CommandSpec {
            program: self.program.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
        }
    }
}

impl BenchConfig {
    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        config.apply_env_overrides();
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn from_toml(text: &str) -> Result<Self, BenchError> {
        toml::from_str(text).map_err(|e| BenchError::Config(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(api_base) = std::env::var("SYNTH_BENCH_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = std::env::var("SYNTH_BENCH_GEN_MODEL") {
            self.generation.model = model;
        }
        if let Ok(n) = std::env::var("SYNTH_BENCH_NUM_PROBLEMS") {
            match n.parse() {
                Ok(n) => self.generation.num_problems = n,
                Err(_) => warn!("Ignoring invalid SYNTH_BENCH_NUM_PROBLEMS={}", n),
            }
        }
        if let Ok(model) = std::env::var("SYNTH_BENCH_GRADER_MODEL") {
            self.grading.grader_model = model;
        }
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.generation.num_problems == 0 {
            return Err(BenchError::Config(
                "generation.num_problems must be at least 1".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(BenchError::Config("generation.model is empty".to_string()));
        }
        let timeouts = [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("timeouts.llm_secs", self.timeouts.llm_secs),
            ("timeouts.agent_secs", self.timeouts.agent_secs),
            ("timeouts.tests_secs", self.timeouts.tests_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(BenchError::Config(format!("{} must be positive", name)));
            }
        }
        self.scoring.validate()?;
        Ok(())
    }

    pub fn generation_parameters(
        &self,
        template: Arc<dyn PromptTemplate>,
    ) -> ProblemGeneratorParameters {
        ProblemGeneratorParameters {
            selection: self.generation.selection,
            template,
            num_problems_to_gen: self.generation.num_problems,
            problem_gen_model: self.generation.model.clone(),
            count_policy: self.generation.count_policy,
        }
    }

    pub fn grader_config(&self) -> GraderConfig {
        GraderConfig {
            sanitizer_model: self.grading.sanitizer_model.clone(),
            grader_model: self.grading.grader_model.clone(),
            system_prompt: self.grading.grader_system_prompt.clone(),
            llm_timeout_secs: self.timeouts.llm_secs,
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            miner_model: self.agent.miner_model.clone(),
            agent_timeout_secs: self.timeouts.agent_secs,
            tests_timeout_secs: self.timeouts.tests_secs,
        }
    }
}
