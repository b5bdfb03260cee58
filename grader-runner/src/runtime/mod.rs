//! Container runtime access
//!
//! - `backend`: the trait boundary onto the container runtime
//! - `cli`: docker/podman implementation of that boundary
//! - `session`: the shared, explicitly opened and closed runtime handle

mod backend;
mod cli;
mod session;

pub use backend::{ContainerBackend, LogStream, SandboxHandle, SandboxSpec};
pub use cli::CliBackend;
pub use session::RuntimeSession;
