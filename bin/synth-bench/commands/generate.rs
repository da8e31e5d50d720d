//! Generate command - problem statements from file pairs

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use synth_bench::llm_client::OpenAiClient;
use synth_bench::marshal::{from_structured, to_structured};
use synth_bench::problem::FilePair;
use synth_bench::synthetic::{FilesTemplate, ProblemGenerator};
use synth_bench::BenchConfig;

use super::read_json;
use crate::style::*;

pub struct Args {
    pub repo: PathBuf,
    pub pairs: PathBuf,
    pub template: Option<PathBuf>,
    pub num_problems: Option<usize>,
    pub output: Option<PathBuf>,
}

pub async fn run(mut config: BenchConfig, args: Args) -> Result<()> {
    if let Some(n) = args.num_problems {
        if n == 0 {
            bail!("--num-problems must be at least 1");
        }
        config.generation.num_problems = n;
    }

    print_step(1, 3, "Loading file pairs...");
    let pairs_value = read_json(&args.pairs)?;
    let Some(items) = pairs_value.as_array() else {
        bail!("{} must contain a JSON array of file pairs", args.pairs.display());
    };
    let pairs = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            from_structured::<FilePair>(item).with_context(|| format!("file pair [{}]", i))
        })
        .collect::<Result<Vec<_>>>()?;

    let template = match &args.template {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            FilesTemplate::new(source)?
        }
        None => FilesTemplate::default(),
    };

    print_step(
        2,
        3,
        &format!(
            "Generating {} problems with {} from {} candidate pairs...",
            config.generation.num_problems,
            config.generation.model,
            pairs.len()
        ),
    );
    let llm = Arc::new(OpenAiClient::new(config.llm.clone())?);
    let generator = ProblemGenerator::new(llm, config.timeouts.llm_secs);
    let params = config.generation_parameters(Arc::new(template));
    let list = generator.generate(&args.repo, &pairs, &params).await?;

    print_step(3, 3, "Writing problem statements...");
    let json = serde_json::to_string_pretty(&to_structured(&list)?)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!(
                "Wrote {} problem statements to {}",
                list.problem_statements.len(),
                path.display()
            ));
        }
        None => println!("{}", json),
    }

    let cost: f64 = list
        .problem_statements
        .first()
        .and_then(|s| s.model_stats.as_ref())
        .map(|s| s.cost)
        .unwrap_or(0.0);
    print_info(&format!(
        "Usage: {} prompt / {} completion tokens (${:.4})",
        list.prompt_tokens, list.completion_tokens, cost
    ));
    Ok(())
}
