//! Docker-compatible CLI backend
//!
//! Drives `docker` or `podman` through one client process per operation:
//! - Probing the runtime with `version`
//! - Creating, starting, killing and removing sandboxes
//! - Following sandbox logs through a child process owned by the stream
//! - Waiting for the sandbox exit status

use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use async_trait::async_trait;
use grader_core::{GraderError, Result};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use super::backend::{ContainerBackend, LogStream, SandboxHandle, SandboxSpec};

/// Container backend that shells out to a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
}

impl CliBackend {
    /// Creates a backend for the given client binary (e.g. "docker", "podman")
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// Runs one client command and returns its trimmed stdout
    async fn invoke(&self, args: &[&str]) -> Result<String> {
        let verb = args.first().copied().unwrap_or_default();
        debug!("{} {}", self.program, verb);

        let output = self.command(args).output().await.map_err(|e| {
            GraderError::Connection(format!("failed to execute '{}': {}", self.program, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            debug!("{} {} stderr: {}", self.program, verb, stderr.trim());
        }

        if !output.status.success() {
            return Err(classify_failure(
                &self.program,
                verb,
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ));
        }

        Ok(stdout.trim().to_string())
    }
}

/// Maps a failed client invocation onto the error taxonomy
fn classify_failure(program: &str, verb: &str, exit_code: i32, stderr: &str) -> GraderError {
    let lower = stderr.to_ascii_lowercase();
    let unreachable = lower.contains("cannot connect")
        || lower.contains("connection refused")
        || lower.contains("is the docker daemon running")
        || lower.contains("unable to connect to podman");

    let message = format!(
        "'{} {}' failed: exit_code={}, stderr='{}'",
        program, verb, exit_code, stderr
    );
    if unreachable {
        GraderError::Connection(message)
    } else {
        GraderError::Runtime(message)
    }
}

/// Arguments for `create`
///
/// Images are never pulled: a missing image fails the create at once. The
/// image entrypoint is replaced so the script always runs under sh.
fn create_args(spec: &SandboxSpec) -> [&str; 10] {
    [
        "create",
        "--pull",
        "never",
        "--name",
        spec.name.as_str(),
        "--entrypoint",
        "/bin/sh",
        spec.image.as_str(),
        "-c",
        spec.script.as_str(),
    ]
}

fn is_not_running(err: &GraderError) -> bool {
    matches!(err, GraderError::Runtime(msg) if msg.to_ascii_lowercase().contains("is not running"))
}

fn is_no_such_container(err: &GraderError) -> bool {
    matches!(err, GraderError::Runtime(msg) if msg.to_ascii_lowercase().contains("no such container"))
}

#[async_trait]
impl ContainerBackend for CliBackend {
    async fn ping(&self) -> Result<()> {
        let version = self.invoke(&["version"]).await.map_err(|e| match e {
            GraderError::Runtime(msg) => GraderError::Connection(msg),
            other => other,
        })?;
        info!(
            "Container runtime '{}' is available: {}",
            self.program,
            version.lines().next().unwrap_or_default()
        );
        Ok(())
    }

    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        let id = self.invoke(&create_args(spec)).await?;

        if id.is_empty() {
            return Err(GraderError::Runtime(format!(
                "'{} create' returned no container id for {}",
                self.program, spec.name
            )));
        }

        Ok(SandboxHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<()> {
        self.invoke(&["start", handle.id.as_str()]).await.map(|_| ())
    }

    async fn logs(&self, handle: &SandboxHandle) -> Result<LogStream> {
        let mut child = self
            .command(&["logs", "--follow", handle.id.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                GraderError::Connection(format!("failed to execute '{}': {}", self.program, e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            GraderError::Runtime(format!("log stream for {} has no stdout", handle.name))
        })?;

        Ok(Box::new(ChildLogStream {
            _child: child,
            stdout,
        }))
    }

    async fn wait(&self, handle: &SandboxHandle) -> Result<i64> {
        let status = self.invoke(&["wait", handle.id.as_str()]).await?;
        status
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .map_err(|_| {
                GraderError::Runtime(format!(
                    "unexpected exit status '{}' for {}",
                    status, handle.name
                ))
            })
    }

    async fn kill(&self, handle: &SandboxHandle) -> Result<()> {
        match self.invoke(&["kill", handle.id.as_str()]).await {
            Err(e) if is_not_running(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<()> {
        match self.invoke(&["rm", "--force", handle.id.as_str()]).await {
            Err(e) if is_no_such_container(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

/// Log stream backed by a `logs --follow` client process
///
/// The child is killed when the stream is dropped, which closes its pipe.
struct ChildLogStream {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildLogStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}
