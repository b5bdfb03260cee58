//! Runtime session
//!
//! One session is opened at process start and shared by every run through an
//! `Arc`. It holds no per-job state and adds no locking of its own; the
//! backend is responsible for tolerating concurrent calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use grader_core::{GraderError, Result};
use tracing::{debug, info};

use super::backend::ContainerBackend;
use super::cli::CliBackend;
use crate::config::RunnerConfig;

/// Shared handle to the container runtime
pub struct RuntimeSession {
    backend: Arc<dyn ContainerBackend>,
    closed: AtomicBool,
}

impl RuntimeSession {
    /// Opens a session after a bounded liveness probe
    ///
    /// # Arguments
    /// * `backend` - Runtime client to use for every operation
    /// * `probe_timeout` - How long the runtime may take to answer the probe
    ///
    /// # Returns
    /// The open session, or `Connection` if the runtime is unreachable
    pub async fn open(
        backend: Arc<dyn ContainerBackend>,
        probe_timeout: Duration,
    ) -> Result<Arc<Self>> {
        match tokio::time::timeout(probe_timeout, backend.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(match e {
                    GraderError::Connection(_) => e,
                    other => GraderError::Connection(other.to_string()),
                });
            }
            Err(_) => {
                return Err(GraderError::Connection(format!(
                    "runtime did not answer liveness probe within {:?}",
                    probe_timeout
                )));
            }
        }

        info!("Runtime session opened");
        Ok(Arc::new(Self {
            backend,
            closed: AtomicBool::new(false),
        }))
    }

    /// Opens a session on the CLI backend named in `config`
    pub async fn connect(config: &RunnerConfig) -> Result<Arc<Self>> {
        let backend = Arc::new(CliBackend::new(config.runtime.program()));
        Self::open(backend, config.probe_timeout).await
    }

    /// Returns the backend, or `Connection` once the session is closed
    pub fn backend(&self) -> Result<&dyn ContainerBackend> {
        if self.is_closed() {
            return Err(GraderError::Connection("session closed".to_string()));
        }
        Ok(self.backend.as_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Runtime session already closed");
            return;
        }
        self.backend.close().await;
        info!("Runtime session closed");
    }

    /// Backend handle that stays usable after close, for cleanup only
    pub(crate) fn cleanup_backend(&self) -> Arc<dyn ContainerBackend> {
        Arc::clone(&self.backend)
    }
}
