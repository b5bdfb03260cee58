//! Job runner
//!
//! Runs one job in one sandbox under a caller-supplied context:
//! - Validating the job before touching the runtime
//! - Creating and starting the sandbox with the rendered script
//! - Racing natural completion against cancellation of the context
//! - Draining the log stream through a bounded capturer
//! - Removing the sandbox and closing the log stream on every path
//!
//! Runs share nothing but the runtime session, so any number may be in
//! flight at once.

use std::sync::Arc;
use std::time::Duration;

use grader_core::{CancelReason, ExecutionResult, GraderError, Job, Outcome};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capture::OutputCapturer;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::runtime::{RuntimeSession, SandboxSpec};
use crate::sandbox::Sandbox;

/// How the completion/cancellation race ended
enum Race {
    Finished {
        drained: std::io::Result<u64>,
        status: grader_core::Result<i64>,
    },
    /// `wait` failed before the sandbox was seen to exit
    WaitFailed(GraderError),
    Cancelled(CancelReason),
}

/// Executes jobs against a shared runtime session
#[derive(Clone)]
pub struct JobRunner {
    session: Arc<RuntimeSession>,
    config: Arc<RunnerConfig>,
}

impl JobRunner {
    /// Creates a runner
    ///
    /// # Arguments
    /// * `session` - Open runtime session shared with other runners
    /// * `config` - Output limits, command policy and cleanup budgets
    pub fn new(session: Arc<RuntimeSession>, config: RunnerConfig) -> Self {
        Self {
            session,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<RuntimeSession> {
        &self.session
    }

    /// Runs `job` until it exits or `ctx` fires
    ///
    /// The sandbox is removed and its log stream closed before this returns,
    /// whichever way the run ends.
    ///
    /// # Returns
    /// - Completed: captured output
    /// - Timed out: [`grader_core::TIMEOUT_MESSAGE`] with a `Timeout` error
    /// - Failed: partial output (or empty) with the error that ended the run
    pub async fn run(&self, ctx: &RunContext, job: &Job) -> ExecutionResult {
        let started = Instant::now();

        if let Err(e) = job.validate() {
            warn!("Rejected job '{}': {}", job.name, e);
            return ExecutionResult::failed(String::new(), e, started.elapsed());
        }

        if let Some(reason) = ctx.err() {
            info!("Job {} not started: {}", job.name, reason);
            return ExecutionResult::timed_out(reason, started.elapsed());
        }

        info!(
            "Starting job {} (image {}, {} command(s))",
            job.name,
            job.image,
            job.commands.len()
        );

        let result = self.execute(ctx, job, started).await;

        match result.outcome() {
            Outcome::Completed => info!(
                "Job {} completed in {:?}",
                job.name, result.elapsed
            ),
            Outcome::TimedOut => info!(
                "Job {} timed out after {:?}",
                job.name, result.elapsed
            ),
            Outcome::Failed => match &result.error {
                Some(GraderError::Execution { exit_code }) => {
                    info!("Job {} exited with status {}", job.name, exit_code)
                }
                Some(e) => error!("Job {} failed: {}", job.name, e),
                None => {}
            },
        }
        if result.truncated {
            debug!("Output of job {} was truncated", job.name);
        }

        result
    }

    async fn execute(&self, ctx: &RunContext, job: &Job, started: Instant) -> ExecutionResult {
        let cleanup_timeout = self.config.cleanup_timeout;
        let spec = SandboxSpec {
            name: job.name.clone(),
            image: job.image.clone(),
            script: self.config.command_policy.render(&job.commands),
        };

        let created = ctx
            .run_until_cancelled(Sandbox::create(&self.session, &spec, cleanup_timeout))
            .await;
        let mut sandbox = match created {
            Ok(Ok(sandbox)) => sandbox,
            Ok(Err(e)) => return ExecutionResult::failed(String::new(), e, started.elapsed()),
            Err(reason) => {
                debug!("Context of job {} fired during create: {}", job.name, reason);
                Sandbox::discard(&self.session, &spec.name, cleanup_timeout).await;
                return ExecutionResult::timed_out(reason, started.elapsed());
            }
        };

        match ctx.run_until_cancelled(sandbox.start()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                sandbox.remove().await;
                return ExecutionResult::failed(String::new(), e, started.elapsed());
            }
            Err(reason) => {
                debug!("Context of job {} fired during start: {}", job.name, reason);
                sandbox.remove().await;
                return ExecutionResult::timed_out(reason, started.elapsed());
            }
        }

        let mut logs = match ctx.run_until_cancelled(sandbox.logs()).await {
            Ok(Ok(logs)) => logs,
            Ok(Err(e)) => {
                sandbox.kill(self.config.kill_grace).await;
                sandbox.remove().await;
                return ExecutionResult::failed(String::new(), e, started.elapsed());
            }
            Err(reason) => {
                debug!("Context of job {} fired attaching logs: {}", job.name, reason);
                sandbox.kill(self.config.kill_grace).await;
                sandbox.remove().await;
                return ExecutionResult::timed_out(reason, started.elapsed());
            }
        };

        let mut capturer = OutputCapturer::new(self.config.capture.clone());

        let race = {
            let completion = async {
                let drain = tokio::io::copy(&mut logs, &mut capturer);
                let wait = sandbox.wait();
                tokio::pin!(drain, wait);

                // A failed wait says nothing about the sandbox, so stop there
                // instead of draining a stream that may never end.
                tokio::select! {
                    status = &mut wait => match status {
                        Ok(code) => Race::Finished {
                            drained: drain.await,
                            status: Ok(code),
                        },
                        Err(e) => Race::WaitFailed(e),
                    },
                    drained = &mut drain => Race::Finished {
                        drained,
                        status: wait.await,
                    },
                }
            };

            tokio::select! {
                finished = completion => finished,
                reason = ctx.cancelled() => Race::Cancelled(reason),
            }
        };

        match race {
            Race::Finished { drained, status } => {
                drop(logs);

                if let Err(e) = drained {
                    warn!("Failed to read log stream of job {}: {}", job.name, e);
                }
                if let Ok(code) = status {
                    sandbox.mark_exited(code);
                }
                sandbox.remove().await;

                let captured = capturer.finish();
                let elapsed = started.elapsed();
                let result = match status {
                    Ok(0) => ExecutionResult::completed(captured.text, captured.truncated, elapsed),
                    Ok(exit_code) => ExecutionResult::failed(
                        captured.text,
                        GraderError::Execution { exit_code },
                        elapsed,
                    ),
                    Err(e) => ExecutionResult::failed(captured.text, e, elapsed),
                };
                result.with_truncated(captured.truncated)
            }
            Race::WaitFailed(e) => {
                warn!("Lost track of job {}: {}", job.name, e);
                sandbox.kill(self.config.kill_grace).await;
                drop(logs);
                sandbox.remove().await;

                let captured = capturer.finish();
                ExecutionResult::failed(captured.text, e, started.elapsed())
                    .with_truncated(captured.truncated)
            }
            Race::Cancelled(reason) => {
                debug!("Context of job {} fired: {}", job.name, reason);
                sandbox.kill(self.config.kill_grace).await;
                drop(logs);
                sandbox.remove().await;
                ExecutionResult::timed_out(reason, started.elapsed())
            }
        }
    }

    /// Runs a batch concurrently, at most `max_parallel_jobs` at a time
    ///
    /// Results come back in the order the jobs were given. Every job gets its
    /// own sandbox and capturer. Each job's deadline is `job_timeout` from the
    /// moment it gets a slot, never later than `ctx`'s own.
    pub async fn run_all(&self, ctx: &RunContext, jobs: Vec<Job>) -> Vec<ExecutionResult> {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_jobs));
        let mut tasks = JoinSet::new();

        info!(
            "Running batch of {} job(s), up to {} at a time",
            total, self.config.max_parallel_jobs
        );

        for (index, job) in jobs.into_iter().enumerate() {
            let runner = self.clone();
            let ctx = ctx.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = semaphore.acquire_owned().await.ok();
                let ctx = ctx.child_with_timeout(runner.config.job_timeout);
                (index, runner.run(&ctx, &job).await)
            });
        }

        let mut results: Vec<Option<ExecutionResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Job task panicked: {}", e),
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    ExecutionResult::failed(
                        String::new(),
                        GraderError::Runtime("job task panicked".to_string()),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    }
}
