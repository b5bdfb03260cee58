//! Execution result types

use std::time::Duration;

use crate::error::GraderError;

/// Coarse outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    TimedOut,
    Failed,
}

/// Result of a single run
///
/// `output` is always present: captured text on completion, partial text on
/// a failed exit, or [`crate::TIMEOUT_MESSAGE`] on timeout.
#[derive(Debug)]
pub struct ExecutionResult {
    pub output: String,
    pub error: Option<GraderError>,
    pub exit_code: Option<i64>,
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A run that finished with a zero exit status
    pub fn completed(output: String, truncated: bool, elapsed: Duration) -> Self {
        Self {
            output,
            error: None,
            exit_code: Some(0),
            truncated,
            elapsed,
        }
    }

    /// A run that ended with an error before or instead of completion
    pub fn failed(output: String, error: GraderError, elapsed: Duration) -> Self {
        let exit_code = match &error {
            GraderError::Execution { exit_code } => Some(*exit_code),
            _ => None,
        };
        Self {
            output,
            error: Some(error),
            exit_code,
            truncated: false,
            elapsed,
        }
    }

    /// A run whose context fired first
    pub fn timed_out(reason: crate::CancelReason, elapsed: Duration) -> Self {
        Self::failed(
            crate::TIMEOUT_MESSAGE.to_string(),
            GraderError::Timeout(reason),
            elapsed,
        )
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn outcome(&self) -> Outcome {
        match &self.error {
            None => Outcome::Completed,
            Some(GraderError::Timeout(_)) => Outcome::TimedOut,
            Some(_) => Outcome::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Splits into the `(output, error)` pair callers consume
    pub fn into_parts(self) -> (String, Option<GraderError>) {
        (self.output, self.error)
    }

    /// Converts into a plain result, discarding output on error
    pub fn into_result(self) -> Result<String, GraderError> {
        match self.error {
            None => Ok(self.output),
            Some(e) => Err(e),
        }
    }
}
