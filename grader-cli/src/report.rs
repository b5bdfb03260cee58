//! Per-job reports
//!
//! Human-readable status lines and the JSON shape printed by `batch --json`.

use colored::*;
use grader_core::{ExecutionResult, Job, Outcome};
use serde::Serialize;

/// Outcome of one job in a form the CLI prints
#[derive(Debug, Serialize)]
pub struct JobReport<'a> {
    pub name: &'a str,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub truncated: bool,
    pub elapsed_ms: u128,
    pub output: &'a str,
}

impl<'a> JobReport<'a> {
    pub fn new(job: &'a Job, result: &'a ExecutionResult) -> Self {
        Self {
            name: &job.name,
            outcome: outcome_label(result.outcome()),
            exit_code: result.exit_code,
            error: result.error.as_ref().map(|e| e.to_string()),
            truncated: result.truncated,
            elapsed_ms: result.elapsed.as_millis(),
            output: &result.output,
        }
    }

    /// One line: symbol, name, outcome and timing
    pub fn status_line(&self) -> String {
        let symbol = match self.outcome {
            "completed" => "✓".green().bold(),
            "timed out" => "⏱".yellow().bold(),
            _ => "✗".red().bold(),
        };
        let outcome = match self.outcome {
            "completed" => self.outcome.green(),
            "timed out" => self.outcome.yellow(),
            _ => self.outcome.red(),
        };

        let mut line = format!(
            "{} {} {} in {:.2}s",
            symbol,
            self.name.bold(),
            outcome,
            self.elapsed_ms as f64 / 1000.0
        );
        if let Some(error) = &self.error {
            line.push_str(&format!(" ({})", error).dimmed().to_string());
        }
        if self.truncated {
            line.push_str(&" [output truncated]".dimmed().to_string());
        }
        line
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Completed => "completed",
        Outcome::TimedOut => "timed out",
        Outcome::Failed => "failed",
    }
}
