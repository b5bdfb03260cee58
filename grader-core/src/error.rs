//! Error types for the execution engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, GraderError>;

/// Why a run context stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelReason {
    /// The context deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The context was cancelled explicitly
    #[error("context cancelled")]
    Cancelled,
}

/// Errors surfaced by the execution engine
#[derive(Debug, Error)]
pub enum GraderError {
    /// Malformed job, rejected before any sandbox exists
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Container runtime unreachable or session closed
    #[error("Container runtime unreachable: {0}")]
    Connection(String),

    /// Container runtime rejected an operation
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// Context fired before the sandbox finished
    #[error("Job timed out: {0}")]
    Timeout(#[source] CancelReason),

    /// Sandboxed process exited with a non-zero status
    #[error("Job exited with status {exit_code}")]
    Execution {
        /// Exit status reported by the runtime
        exit_code: i64,
    },
}

impl GraderError {
    /// Create an invalid job error
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob(message.into())
    }

    /// Check if the context fired before completion
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error is the deadline-exceeded condition of a context
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Timeout(CancelReason::DeadlineExceeded))
    }

    /// Check if a caller could reasonably resubmit the same job
    ///
    /// The engine never retries on its own; this only classifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Runtime(_))
    }
}
