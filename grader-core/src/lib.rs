//! Grader Core
//!
//! Core types shared by the execution engine and its callers.
//!
//! This crate contains:
//! - Job: the request submitted to the engine
//! - ExecutionResult: captured output plus outcome
//! - GraderError: the error taxonomy surfaced to callers

pub mod error;
pub mod job;
pub mod result;

pub use error::{CancelReason, GraderError, Result};
pub use job::Job;
pub use result::{ExecutionResult, Outcome};

/// Text returned in place of output when a job is killed by its deadline.
///
/// Callers match on this literal, so it must never change.
pub const TIMEOUT_MESSAGE: &str =
    "Container timeout. Please check for infinite loops or other slowness.";
