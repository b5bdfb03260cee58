//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod batch;
mod ping;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use grader_runner::RunnerConfig;

/// Exit status for a job that failed or could not run
pub const EXIT_FAILED: u8 = 1;

/// Exit status for a job that hit its deadline, as `timeout(1)` uses
pub const EXIT_TIMED_OUT: u8 = 124;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the container runtime answers
    Ping,
    /// Run one job and print its output
    Run {
        /// Sandbox name (default: grader-<random>)
        #[arg(long)]
        name: Option<String>,

        /// Container image to run the commands in
        #[arg(long)]
        image: String,

        /// Deadline in seconds (default: GRADER_JOB_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,

        /// Shell commands, run in order
        #[arg(last = true, required = true)]
        commands: Vec<String>,
    },
    /// Run a JSON array of jobs concurrently
    Batch {
        /// File holding `[{"name": .., "image": .., "commands": [..]}, ..]`
        file: PathBuf,

        /// Deadline in seconds for each job (default: GRADER_JOB_TIMEOUT)
        #[arg(long)]
        timeout: Option<u64>,

        /// Print one JSON object per job instead of a summary
        #[arg(long)]
        json: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - Runner configuration
///
/// # Returns
/// Process exit code on success
pub async fn handle_command(command: Commands, config: RunnerConfig) -> Result<ExitCode> {
    match command {
        Commands::Ping => ping::handle_ping(config).await,
        Commands::Run {
            name,
            image,
            timeout,
            commands,
        } => run::handle_run(config, name, image, timeout, commands).await,
        Commands::Batch {
            file,
            timeout,
            json,
        } => batch::handle_batch(config, &file, timeout, json).await,
    }
}
