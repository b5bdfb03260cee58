//! Run context
//!
//! Caller-owned cancellation for a run: an explicit cancel token plus an
//! optional deadline. Clones share the same token, so cancelling any clone
//! stops every run using it.

use std::time::Duration;

use grader_core::CancelReason;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation handle passed into [`crate::JobRunner::run`]
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that only ends when cancelled explicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child context that also expires after `timeout`
    ///
    /// The child is cancelled with its parent and keeps the earlier of the
    /// two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is live
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => CancelReason::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Drives `step` to completion unless the context ends first
    ///
    /// On cancellation `step` is dropped unfinished and the reason returned.
    pub async fn run_until_cancelled<F: Future>(
        &self,
        step: F,
    ) -> Result<F::Output, CancelReason> {
        tokio::select! {
            output = step => Ok(output),
            reason = self.cancelled() => Err(reason),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}
