//! Sandbox lifecycle
//!
//! A `Sandbox` owns one container for the duration of a single run and walks
//! it through `Created -> Started -> Running -> {Exited | Killed} -> Removed`.
//! Removal is explicit; a sandbox dropped before removal schedules a forced
//! removal on the current runtime so an abandoned run never leaves a
//! container behind.

use std::sync::Arc;
use std::time::Duration;

use grader_core::Result;
use tracing::{debug, error, warn};

use crate::runtime::{LogStream, RuntimeSession, SandboxHandle, SandboxSpec};

/// Lifecycle state of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Started,
    /// Started with a log stream attached
    Running,
    Exited(i64),
    Killed,
    Removed,
}

impl SandboxState {
    /// Whether `next` is a legal successor of this state
    ///
    /// `Removed` is reachable from every state and leaves nowhere.
    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        match (self, next) {
            (Removed, _) => false,
            (_, Removed) => true,
            (Created, Started) => true,
            (Started, Running) => true,
            (Started | Running, Exited(_) | Killed) => true,
            _ => false,
        }
    }
}

/// One container owned by one run
pub(crate) struct Sandbox {
    handle: SandboxHandle,
    session: Arc<RuntimeSession>,
    state: SandboxState,
    cleanup_timeout: Duration,
}

impl Sandbox {
    /// Creates the container described by `spec`
    pub async fn create(
        session: &Arc<RuntimeSession>,
        spec: &SandboxSpec,
        cleanup_timeout: Duration,
    ) -> Result<Self> {
        let handle = session.backend()?.create(spec).await?;
        debug!("Sandbox {} created with id {}", handle.name, handle.id);

        Ok(Self {
            handle,
            session: Arc::clone(session),
            state: SandboxState::Created,
            cleanup_timeout,
        })
    }

    /// Force-removes a sandbox by name after its `create` was abandoned
    ///
    /// The runtime may have made the container even though the call never
    /// returned. Failures are logged, never returned.
    pub async fn discard(session: &RuntimeSession, name: &str, cleanup_timeout: Duration) {
        let backend = session.cleanup_backend();
        let handle = SandboxHandle {
            id: name.to_string(),
            name: name.to_string(),
        };

        match tokio::time::timeout(cleanup_timeout, backend.remove(&handle)).await {
            Ok(Ok(())) => debug!("Sandbox {} discarded", name),
            Ok(Err(e)) => warn!("Failed to discard sandbox {}: {}", name, e),
            Err(_) => warn!(
                "Discarding sandbox {} did not finish within {:?}",
                name, cleanup_timeout
            ),
        }
    }

    fn transition(&mut self, next: SandboxState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Sandbox {}: unexpected transition {:?} -> {:?}",
                self.handle.name, self.state, next
            );
        }
        debug!(
            "Sandbox {}: {:?} -> {:?}",
            self.handle.name, self.state, next
        );
        self.state = next;
    }

    pub async fn start(&mut self) -> Result<()> {
        self.session.backend()?.start(&self.handle).await?;
        self.transition(SandboxState::Started);
        Ok(())
    }

    /// Attaches a follow-mode stream over the combined output
    pub async fn logs(&mut self) -> Result<LogStream> {
        let stream = self.session.backend()?.logs(&self.handle).await?;
        self.transition(SandboxState::Running);
        Ok(stream)
    }

    /// Resolves with the exit status of the sandboxed process
    pub async fn wait(&self) -> Result<i64> {
        self.session.backend()?.wait(&self.handle).await
    }

    pub fn mark_exited(&mut self, exit_code: i64) {
        self.transition(SandboxState::Exited(exit_code));
    }

    /// Kills the sandbox and waits up to `grace` for it to report stopped
    ///
    /// Failures are logged; the caller proceeds to removal either way.
    pub async fn kill(&mut self, grace: Duration) {
        let backend = self.session.cleanup_backend();
        let name = &self.handle.name;

        match tokio::time::timeout(self.cleanup_timeout, backend.kill(&self.handle)).await {
            Ok(Ok(())) => debug!("Sandbox {} killed", name),
            Ok(Err(e)) => warn!("Failed to kill sandbox {}: {}", name, e),
            Err(_) => warn!(
                "Killing sandbox {} did not finish within {:?}",
                name, self.cleanup_timeout
            ),
        }

        match tokio::time::timeout(grace, backend.wait(&self.handle)).await {
            Ok(Ok(status)) => debug!("Sandbox {} stopped with status {}", name, status),
            Ok(Err(e)) => warn!("Could not confirm sandbox {} stopped: {}", name, e),
            Err(_) => warn!(
                "Sandbox {} did not stop within {:?}, forcing removal",
                name, grace
            ),
        }

        self.transition(SandboxState::Killed);
    }

    /// Removes the container; failures are logged, never returned
    pub async fn remove(mut self) {
        let backend = self.session.cleanup_backend();

        match tokio::time::timeout(self.cleanup_timeout, backend.remove(&self.handle)).await {
            Ok(Ok(())) => debug!("Sandbox {} removed", self.handle.name),
            Ok(Err(e)) => warn!("Failed to remove sandbox {}: {}", self.handle.name, e),
            Err(_) => warn!(
                "Removing sandbox {} did not finish within {:?}",
                self.handle.name, self.cleanup_timeout
            ),
        }

        self.transition(SandboxState::Removed);
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.state == SandboxState::Removed {
            return;
        }

        warn!(
            "Sandbox {} dropped in state {:?}, scheduling forced removal",
            self.handle.name, self.state
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(
                "No runtime available to remove sandbox {} ({})",
                self.handle.name, self.handle.id
            );
            return;
        };

        let backend = self.session.cleanup_backend();
        let handle = self.handle.clone();
        runtime.spawn(async move {
            if let Err(e) = backend.remove(&handle).await {
                warn!("Failed to remove abandoned sandbox {}: {}", handle.name, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use SandboxState::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Created.can_transition_to(Started));
        assert!(Started.can_transition_to(Running));
        assert!(Running.can_transition_to(Exited(0)));
        assert!(Running.can_transition_to(Killed));
        assert!(Started.can_transition_to(Killed));
    }

    #[test]
    fn test_removed_is_terminal_and_always_reachable() {
        for state in [Created, Started, Running, Exited(1), Killed] {
            assert!(state.can_transition_to(Removed), "{:?}", state);
        }
        for state in [Created, Started, Running, Exited(0), Killed, Removed] {
            assert!(!Removed.can_transition_to(state), "{:?}", state);
        }
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Created.can_transition_to(Running));
        assert!(!Created.can_transition_to(Exited(0)));
        assert!(!Exited(0).can_transition_to(Running));
        assert!(!Killed.can_transition_to(Exited(0)));
    }

    #[tokio::test]
    async fn test_dropped_sandbox_is_removed() {
        let fake = Arc::new(FakeBackend::new());
        let session = RuntimeSession::open(fake.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let spec = SandboxSpec {
            name: "abandoned".to_string(),
            image: "alpine".to_string(),
            script: "true".to_string(),
        };

        let mut sandbox = Sandbox::create(&session, &spec, Duration::from_secs(1))
            .await
            .unwrap();
        sandbox.start().await.unwrap();
        assert_eq!(fake.live_sandboxes(), 1);

        drop(sandbox);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fake.live_sandboxes(), 0);
    }
}
