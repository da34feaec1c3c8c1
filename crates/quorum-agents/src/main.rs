use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use coordination::PipelineKind;
use quorum_agents::config::QuorumConfig;
use quorum_agents::input::load_input;
use quorum_agents::modes::{OrchestrationError, PipelineChoice, PipelineDriver, RunConfig};
use quorum_agents::report::write_reports;
use tracing::{error, info};

/// Multi-agent translation refinement.
#[derive(Debug, Parser)]
#[command(name = "quorum", version, about)]
struct Args {
    /// Refinement pipeline to run.
    #[arg(long, value_enum, default_value = "debate")]
    pipeline: PipelineChoice,

    /// Source text; paragraphs are separated by blank lines.
    #[arg(long)]
    input: PathBuf,

    /// Paragraph-aligned reference translation, as NAME=FILE. Repeatable.
    #[arg(long = "reference", value_name = "NAME=FILE")]
    references: Vec<String>,

    /// Model id (overrides QUORUM_MODEL and the config file).
    #[arg(long)]
    model: Option<String>,

    /// Iteration count. Defaults: debate=2, sequential and cognitive loops=3.
    #[arg(long)]
    iterations: Option<i64>,

    /// Free-text steering preference.
    #[arg(long, default_value = "")]
    preference: String,

    /// Prefix for the .json and .md outputs.
    #[arg(long, default_value = "quorum_translation")]
    output_prefix: PathBuf,

    /// Score each sequential draft for readability and feed it forward.
    #[arg(long)]
    readability_feedback: bool,

    /// Optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let config_error = e
                .downcast_ref::<OrchestrationError>()
                .is_some_and(|oe| matches!(oe, OrchestrationError::Configuration(_)));
            if config_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = QuorumConfig::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    let kind = PipelineKind::from(args.pipeline);
    let iterations = match args.iterations {
        Some(n) => u32::try_from(n).map_err(|_| {
            OrchestrationError::Configuration(format!("iterations must be >= 1 (got {n})"))
        })?,
        None => config.default_iterations(kind),
    };
    config.validate(iterations)?;

    let input = load_input(&args.input, &args.references)?;
    let run_config = RunConfig::new(kind, &config.model, iterations, &args.preference)
        .with_readability_feedback(args.readability_feedback);
    let driver = PipelineDriver::new(config.caller()?, run_config);

    info!(
        pipeline = %kind,
        model = %config.model,
        base_url = %config.base_url,
        paragraphs = input.units.len(),
        "quorum starting"
    );
    let result = driver.run(&input).await?;
    let paths = write_reports(&args.output_prefix, &result)?;

    println!("{}", result.final_text);
    println!();
    println!("Wrote {}", paths.json.display());
    println!("Wrote {}", paths.markdown.display());
    Ok(())
}
