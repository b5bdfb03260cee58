//! Container backend boundary
//!
//! The engine talks to the container runtime only through this trait, so the
//! runtime client can be swapped (docker, podman, an in-memory fake in tests).

use async_trait::async_trait;
use grader_core::Result;
use tokio::io::AsyncRead;

/// Live byte stream over a sandbox's combined output
///
/// Dropping the stream closes every descriptor behind it.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// What to create for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub name: String,
    pub image: String,
    /// Script passed to `/bin/sh -c`
    pub script: String,
}

/// Runtime reference to a created sandbox
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxHandle {
    /// Runtime-assigned identifier
    pub id: String,
    /// Name requested at creation
    pub name: String,
}

/// Operations the engine needs from a container runtime
///
/// Implementations must tolerate concurrent calls for different sandboxes.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Liveness probe; fails with `Connection` when the runtime is unreachable
    async fn ping(&self) -> Result<()>;

    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle>;

    async fn start(&self, handle: &SandboxHandle) -> Result<()>;

    /// Opens a follow-mode stream that ends when the sandbox exits
    async fn logs(&self, handle: &SandboxHandle) -> Result<LogStream>;

    /// Resolves with the exit status once the sandboxed process ends
    async fn wait(&self, handle: &SandboxHandle) -> Result<i64>;

    async fn kill(&self, handle: &SandboxHandle) -> Result<()>;

    /// Forced removal; succeeds for running sandboxes too
    async fn remove(&self, handle: &SandboxHandle) -> Result<()>;

    /// Releases runtime resources held by the backend itself
    async fn close(&self) {}
}
