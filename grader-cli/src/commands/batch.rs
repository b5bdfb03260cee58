//! Batch command handler
//!
//! Reads a JSON array of jobs and runs them concurrently through one shared
//! session, printing a summary or one JSON object per job.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use grader_core::{Job, Outcome};
use grader_runner::{JobRunner, RunContext, RunnerConfig, RuntimeSession};
use tracing::info;

use crate::report::JobReport;

/// Runs every job in `file`
///
/// # Arguments
/// * `config` - Runner configuration
/// * `file` - Path to a JSON array of jobs
/// * `timeout` - Per-job deadline in seconds, overriding `job_timeout`
/// * `json` - Print JSON lines instead of a summary
///
/// # Returns
/// 0 when every job completed, 1 otherwise
pub async fn handle_batch(
    mut config: RunnerConfig,
    file: &Path,
    timeout: Option<u64>,
    json: bool,
) -> Result<ExitCode> {
    let jobs = load_jobs(file).await?;
    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(secs) = timeout {
        config.job_timeout = Duration::from_secs(secs);
        config.validate()?;
    }

    let session = RuntimeSession::connect(&config).await?;
    let runner = JobRunner::new(session.clone(), config);

    info!("Loaded {} job(s) from {}", jobs.len(), file.display());
    let results = runner
        .run_all(&RunContext::background(), jobs.clone())
        .await;
    session.close().await;

    let reports: Vec<JobReport> = jobs
        .iter()
        .zip(&results)
        .map(|(job, result)| JobReport::new(job, result))
        .collect();

    if json {
        for report in &reports {
            println!("{}", serde_json::to_string(report)?);
        }
    } else {
        print_summary(&reports);
    }

    let all_completed = results.iter().all(|r| r.outcome() == Outcome::Completed);
    Ok(if all_completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(super::EXIT_FAILED)
    })
}

async fn load_jobs(file: &Path) -> Result<Vec<Job>> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    parse_jobs(&content).with_context(|| format!("Invalid job file {}", file.display()))
}

fn parse_jobs(content: &str) -> Result<Vec<Job>> {
    Ok(serde_json::from_str(content)?)
}

fn print_summary(reports: &[JobReport]) {
    println!("{}", format!("Ran {} job(s):", reports.len()).bold());
    println!();
    for report in reports {
        println!("{}", report.status_line());
        if !report.output.is_empty() {
            println!("{}", "─".repeat(80).dimmed());
            println!("{}", report.output.trim_end());
            println!("{}", "─".repeat(80).dimmed());
        }
        println!();
    }

    let completed = reports.iter().filter(|r| r.outcome == "completed").count();
    println!(
        "{} completed, {} not completed",
        completed.to_string().green().bold(),
        (reports.len() - completed).to_string().red().bold()
    );
}
