//! Run command handler
//!
//! Runs a single job. The job's output goes to stdout untouched; the status
//! line goes to stderr so the output can be piped.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use colored::*;
use grader_core::{Job, Outcome};
use grader_runner::{JobRunner, RunContext, RunnerConfig, RuntimeSession};

use crate::report::JobReport;

/// Runs one job under a fresh deadline
///
/// # Returns
/// 0 when the job completed, 124 when it timed out, 1 otherwise
pub async fn handle_run(
    config: RunnerConfig,
    name: Option<String>,
    image: String,
    timeout: Option<u64>,
    commands: Vec<String>,
) -> Result<ExitCode> {
    let name = name.unwrap_or_else(default_name);
    let job = Job::new(name, image, commands);

    let session = RuntimeSession::connect(&config).await?;
    let runner = JobRunner::new(session.clone(), config);
    let deadline = timeout
        .map(Duration::from_secs)
        .unwrap_or(runner.config().job_timeout);

    let result = runner
        .run(&RunContext::with_timeout(deadline), &job)
        .await;
    session.close().await;

    let report = JobReport::new(&job, &result);
    print!("{}", result.output);
    if !result.output.is_empty() && !result.output.ends_with('\n') {
        println!();
    }
    eprintln!("{}", report.status_line());

    Ok(match result.outcome() {
        Outcome::Completed => ExitCode::SUCCESS,
        Outcome::TimedOut => ExitCode::from(super::EXIT_TIMED_OUT),
        Outcome::Failed => ExitCode::from(super::EXIT_FAILED),
    })
}

fn default_name() -> String {
    format!("grader-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_are_unique_and_valid() {
        let a = default_name();
        let b = default_name();
        assert_ne!(a, b);
        assert!(a.starts_with("grader-"));
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        );
    }
}
