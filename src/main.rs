use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use pa_trace_lib::config;
use pa_trace_lib::models::PolicyChunk;
use pa_trace_lib::pipeline::eval::run_eval;
use pa_trace_lib::pipeline::policy::load_policy_store;
use pa_trace_lib::pipeline::processor::{run_case_file, RunMode};
use pa_trace_lib::pipeline::structuring::{ModelExtractor, OllamaClient};

#[derive(Parser, Debug)]
#[command(
    name = "pa-trace",
    version,
    about = "Draft prior-authorization packets with evidence-traced facts."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on a single case.
    Run {
        /// Path to the case JSON.
        #[arg(long)]
        case: PathBuf,
        /// Output directory for the packet bundle.
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Baseline)]
        mode: Mode,
        /// Policy store JSON (array of {chunk_id, text}).
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Evaluate the pipeline on a folder of case_*.json files.
    Eval {
        #[arg(long)]
        cases: PathBuf,
        /// Gold labels JSON keyed by case_id.
        #[arg(long)]
        gold: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Baseline)]
        mode: Mode,
        #[arg(long)]
        policy: Option<PathBuf>,
    },
}

/// Extraction mode as typed on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Baseline,
    Llm,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Baseline => RunMode::Baseline,
            Mode::Llm => RunMode::Llm,
        }
    }
}

fn main() -> anyhow::Result<()> {
    pa_trace_lib::init_tracing();
    let cli = Cli::parse();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Command::Run {
            case,
            out,
            mode,
            policy,
        } => {
            let store = policy_store(policy.as_deref())?;
            let model = model_extractor(mode.into());
            let bundle = run_case_file(&case, &out, &store, mode.into(), &model)
                .with_context(|| format!("Failed to process case {}", case.display()))?;
            println!(
                "Case {}: {} ({})\nPacket written to {}",
                bundle.case.case_id,
                bundle.checklist.overall_status,
                bundle.extracted.extraction_mode,
                out.display()
            );
        }
        Command::Eval {
            cases,
            gold,
            out,
            mode,
            policy,
        } => {
            let store = policy_store(policy.as_deref())?;
            let model = model_extractor(mode.into());
            let metrics = run_eval(&cases, &gold, &out, mode.into(), &store, &model)
                .with_context(|| format!("Evaluation failed for {}", cases.display()))?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}

fn policy_store(path: Option<&Path>) -> anyhow::Result<Vec<PolicyChunk>> {
    let path = path.map_or_else(config::default_policy_path, Path::to_path_buf);
    load_policy_store(&path)
        .with_context(|| format!("Failed to load policy store {}", path.display()))
}

/// Probe the model backend once, up front. Baseline runs never touch it.
fn model_extractor(mode: RunMode) -> ModelExtractor {
    if mode == RunMode::Baseline {
        return ModelExtractor::unavailable();
    }
    match OllamaClient::from_env() {
        Ok(client) => ModelExtractor::connect(Box::new(client), config::model_override().as_deref()),
        Err(e) => {
            tracing::warn!(error = %e, "Model backend client unavailable, falling back to baseline");
            ModelExtractor::unavailable()
        }
    }
}
