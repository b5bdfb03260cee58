//! Grader Runner
//!
//! Timeout-bounded execution of untrusted commands in ephemeral containers.
//!
//! Architecture:
//! - Runtime: the container backend boundary and the shared session over it
//! - Capture: bounded head/tail output accumulation
//! - Script: command sequencing policy
//! - Sandbox: per-run container lifecycle with guaranteed removal
//! - Runner: the create/start/race/drain/remove protocol
//!
//! A process opens one [`RuntimeSession`], wraps it in a [`JobRunner`], and
//! calls [`JobRunner::run`] from as many tasks as it likes. Each call brings
//! its own [`RunContext`] carrying the deadline.

pub mod capture;
pub mod config;
pub mod context;
pub mod runtime;
mod runner;
mod sandbox;
pub mod script;

#[cfg(test)]
mod testing;

pub use capture::{CaptureLimits, Captured, OutputCapturer};
pub use config::{RunnerConfig, RuntimeKind};
pub use context::RunContext;
pub use runner::JobRunner;
pub use runtime::{CliBackend, ContainerBackend, RuntimeSession};
pub use sandbox::SandboxState;
pub use script::CommandPolicy;
