//! Runner configuration
//!
//! Defines all configurable parameters for the execution engine including
//! the container runtime, time budgets, output limits and command sequencing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::capture::CaptureLimits;
use crate::script::CommandPolicy;

/// Container runtime client to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    #[default]
    Docker,
    Podman,
}

impl RuntimeKind {
    /// Name of the client binary
    pub fn program(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "podman" => Ok(RuntimeKind::Podman),
            other => anyhow::bail!("unknown runtime '{}' (expected docker or podman)", other),
        }
    }
}

/// Engine configuration
///
/// All timeouts are configurable to allow tuning for slow hosts or slow
/// image startup.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Container runtime client
    pub runtime: RuntimeKind,

    /// Default deadline applied by callers that do not bring their own
    pub job_timeout: Duration,

    /// How long a killed sandbox may take to report that it stopped
    pub kill_grace: Duration,

    /// Upper bound for each cleanup call (kill, remove)
    pub cleanup_timeout: Duration,

    /// How long the runtime may take to answer the liveness probe
    pub probe_timeout: Duration,

    /// Bounds on captured output
    pub capture: CaptureLimits,

    /// How a failing command affects the rest of the job
    pub command_policy: CommandPolicy,

    /// Max jobs a batch runs at once
    pub max_parallel_jobs: usize,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(runtime: RuntimeKind) -> Self {
        Self {
            runtime,
            job_timeout: Duration::from_secs(300), // 5 minutes
            kill_grace: Duration::from_secs(10),
            cleanup_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            capture: CaptureLimits::default(),
            command_policy: CommandPolicy::default(),
            max_parallel_jobs: 4,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - GRADER_RUNTIME (docker or podman, default: docker)
    /// - GRADER_JOB_TIMEOUT (seconds, default: 300)
    /// - GRADER_KILL_GRACE (seconds, default: 10)
    /// - GRADER_CLEANUP_TIMEOUT (seconds, default: 30)
    /// - GRADER_PROBE_TIMEOUT (seconds, default: 5)
    /// - GRADER_MAX_LOG_BYTES (default: 1048576)
    /// - GRADER_LOG_HEAD_BYTES (default: 524288)
    /// - GRADER_LOG_TAIL_BYTES (default: 524288)
    /// - GRADER_COMMAND_POLICY (stop-on-failure or run-all)
    /// - GRADER_MAX_PARALLEL_JOBS (default: 4)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let runtime = match lookup("GRADER_RUNTIME") {
            Some(value) => value.parse()?,
            None => RuntimeKind::default(),
        };
        let mut config = Self::new(runtime);

        let secs = |key: &str| {
            lookup(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        let bytes = |key: &str| lookup(key).and_then(|s| s.parse::<usize>().ok());

        if let Some(timeout) = secs("GRADER_JOB_TIMEOUT") {
            config.job_timeout = timeout;
        }
        if let Some(grace) = secs("GRADER_KILL_GRACE") {
            config.kill_grace = grace;
        }
        if let Some(timeout) = secs("GRADER_CLEANUP_TIMEOUT") {
            config.cleanup_timeout = timeout;
        }
        if let Some(timeout) = secs("GRADER_PROBE_TIMEOUT") {
            config.probe_timeout = timeout;
        }
        if let Some(max) = bytes("GRADER_MAX_LOG_BYTES") {
            config.capture.max_bytes = max;
        }
        if let Some(head) = bytes("GRADER_LOG_HEAD_BYTES") {
            config.capture.head_bytes = head;
        }
        if let Some(tail) = bytes("GRADER_LOG_TAIL_BYTES") {
            config.capture.tail_bytes = tail;
        }
        if let Some(policy) = lookup("GRADER_COMMAND_POLICY") {
            config.command_policy = policy.parse()?;
        }
        if let Some(jobs) = bytes("GRADER_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = jobs;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job_timeout.is_zero() {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.kill_grace.is_zero() {
            anyhow::bail!("kill_grace must be greater than 0");
        }

        if self.cleanup_timeout.is_zero() {
            anyhow::bail!("cleanup_timeout must be greater than 0");
        }

        if self.probe_timeout.is_zero() {
            anyhow::bail!("probe_timeout must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        self.capture.validate()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(RuntimeKind::default())
    }
}
