//! synth-bench - synthetic issue benchmark CLI

mod commands;
mod style;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use synth_bench::BenchConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "synth-bench",
    version,
    about = "Generate synthetic repository issues and score coding agents on them"
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SYNTH_BENCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate problem statements from a repository's file pairs
    Generate {
        /// Repository checkout the problems are about
        #[arg(long)]
        repo: PathBuf,

        /// JSON array of candidate file pairs
        #[arg(long)]
        pairs: PathBuf,

        /// Prompt template with a {{ files }} placeholder
        #[arg(long)]
        template: Option<PathBuf>,

        /// Number of problems to generate
        #[arg(short = 'n', long)]
        num_problems: Option<usize>,

        /// Write the statements here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a graded patch
    Score {
        /// Grading model output (MinerLLMEvaluation JSON)
        #[arg(long)]
        evaluation: PathBuf,

        /// Test results JSON
        #[arg(long)]
        tests: PathBuf,

        /// Patch file
        #[arg(long)]
        patch: PathBuf,

        /// Length of the problem's dynamic checklist
        #[arg(long)]
        checklist_len: usize,

        /// Print the score record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize an evaluation log
    Inspect {
        /// Evaluation log JSON
        log: PathBuf,
    },

    /// Solve, test, grade and score generated problems
    Evaluate {
        /// Repository checkout
        #[arg(long)]
        repo: PathBuf,

        /// Name the results are logged under (e.g. pytest-dev/pytest)
        #[arg(long)]
        repo_name: String,

        /// Output of `generate`
        #[arg(long)]
        problems: PathBuf,

        /// Evaluation log to append to
        #[arg(long)]
        log: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<BenchConfig> {
    let config = match path {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BenchConfig::from_env(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        style::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    synth_bench::register_schemas().context("Record schema registration failed")?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Generate {
            repo,
            pairs,
            template,
            num_problems,
            output,
        } => {
            commands::generate::run(
                config,
                commands::generate::Args {
                    repo,
                    pairs,
                    template,
                    num_problems,
                    output,
                },
            )
            .await
        }
        Commands::Score {
            evaluation,
            tests,
            patch,
            checklist_len,
            json,
        } => commands::score::run(&config, &evaluation, &tests, &patch, checklist_len, json),
        Commands::Inspect { log } => commands::inspect::run(&log),
        Commands::Evaluate {
            repo,
            repo_name,
            problems,
            log,
        } => commands::evaluate::run(config, &repo, &repo_name, &problems, &log).await,
    }
}
