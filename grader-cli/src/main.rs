//! Grader CLI
//!
//! Command-line interface for running grading jobs in throwaway containers.

mod commands;
mod report;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use grader_runner::RunnerConfig;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "grader")]
#[command(about = "Run grading jobs in isolated containers", long_about = None)]
struct Cli {
    /// Container runtime client (docker or podman), overrides GRADER_RUNTIME
    #[arg(long, global = true)]
    runtime: Option<String>,

    /// Max jobs a batch runs at once, overrides GRADER_MAX_PARALLEL_JOBS
    #[arg(long, global = true)]
    parallel: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    debug!("Loaded configuration: {:?}", config);

    handle_command(cli.command, config).await
}

/// Loads configuration from the environment, then applies flag overrides
fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config = RunnerConfig::from_env()?;

    if let Some(runtime) = &cli.runtime {
        config.runtime = runtime.parse()?;
    }
    if let Some(parallel) = cli.parallel {
        config.max_parallel_jobs = parallel;
    }

    config.validate()?;
    Ok(config)
}
