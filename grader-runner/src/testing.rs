//! Scripted in-memory container backend
//!
//! Stands in for a real runtime in tests. Each job name maps to a
//! [`FakeBehavior`] describing what the sandbox prints, how long it runs and
//! how it exits. The backend counts live sandboxes and open log streams so
//! tests can assert that nothing leaks.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use grader_core::{GraderError, Result};
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::runtime::{ContainerBackend, LogStream, SandboxHandle, SandboxSpec};

/// Exit status reported for a killed sandbox
pub const KILLED_STATUS: i64 = 137;

/// What a fake sandbox does once started
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub chunks: Vec<Vec<u8>>,
    pub exit_code: i64,
    /// `None` runs until killed
    pub runtime: Option<Duration>,
    pub fail_start: bool,
}

impl FakeBehavior {
    /// Prints `text` and exits 0 immediately
    pub fn output(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::chunks([text.into_bytes()])
    }

    pub fn chunks(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            exit_code: 0,
            runtime: Some(Duration::ZERO),
            fail_start: false,
        }
    }

    pub fn exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn runs_for(mut self, runtime: Duration) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn never_exits(mut self) -> Self {
        self.runtime = None;
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self::output("")
    }
}

struct FakeSandbox {
    name: String,
    behavior: FakeBehavior,
    started_at: Option<Instant>,
    /// Set once the sandbox is killed or removed
    stopped: watch::Sender<Option<i64>>,
}

#[derive(Default)]
struct Flags {
    unreachable: bool,
    hanging_ping: bool,
    failing_create: bool,
    failing_kill: bool,
    failing_wait: bool,
    failing_remove: bool,
    /// Delay before `create` answers, after the sandbox exists
    create_delay: Option<Duration>,
}

/// In-memory [`ContainerBackend`]
#[derive(Default)]
pub struct FakeBackend {
    flags: Flags,
    behaviors: HashMap<String, FakeBehavior>,
    default_behavior: FakeBehavior,
    sandboxes: Mutex<HashMap<String, FakeSandbox>>,
    specs: Mutex<Vec<SandboxSpec>>,
    killed: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    open_streams: Arc<AtomicUsize>,
    close_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behavior for the job with this name
    pub fn with_job(mut self, name: impl Into<String>, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(name.into(), behavior);
        self
    }

    /// Behavior for jobs without an explicit entry
    pub fn with_default(mut self, behavior: FakeBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.flags.unreachable = true;
        self
    }

    pub fn hanging_ping(mut self) -> Self {
        self.flags.hanging_ping = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.flags.failing_create = true;
        self
    }

    pub fn failing_remove(mut self) -> Self {
        self.flags.failing_remove = true;
        self
    }

    pub fn failing_kill(mut self) -> Self {
        self.flags.failing_kill = true;
        self
    }

    /// `wait` fails at once while the sandbox keeps running
    pub fn failing_wait(mut self) -> Self {
        self.flags.failing_wait = true;
        self
    }

    /// `create` makes the sandbox, then takes `delay` to answer
    pub fn slow_create(mut self, delay: Duration) -> Self {
        self.flags.create_delay = Some(delay);
        self
    }

    /// Sandboxes created and not yet removed
    pub fn live_sandboxes(&self) -> usize {
        self.sandboxes.lock().unwrap().len()
    }

    /// Log streams handed out and not yet dropped
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Every spec passed to `create`, in call order
    pub fn specs(&self) -> Vec<SandboxSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Names of killed sandboxes, in call order
    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        handle: &SandboxHandle,
    ) -> Result<(FakeBehavior, Option<Instant>, watch::Receiver<Option<i64>>)> {
        let sandboxes = self.sandboxes.lock().unwrap();
        let sandbox = sandboxes
            .get(&handle.id)
            .ok_or_else(|| GraderError::Runtime(format!("No such container: {}", handle.id)))?;
        Ok((
            sandbox.behavior.clone(),
            sandbox.started_at,
            sandbox.stopped.subscribe(),
        ))
    }
}

/// Resolves with the exit status: natural exit or kill, whichever is first
async fn exit_status(
    behavior: &FakeBehavior,
    started_at: Instant,
    mut stopped: watch::Receiver<Option<i64>>,
) -> Result<i64> {
    let natural = async {
        match behavior.runtime {
            Some(runtime) => {
                tokio::time::sleep_until(started_at + runtime).await;
                behavior.exit_code
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        code = natural => Ok(code),
        state = stopped.wait_for(|s| s.is_some()) => match state {
            Ok(state) => Ok((*state).unwrap_or(KILLED_STATUS)),
            Err(_) => Err(GraderError::Runtime("sandbox vanished".to_string())),
        },
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    async fn ping(&self) -> Result<()> {
        if self.flags.hanging_ping {
            std::future::pending::<()>().await;
        }
        if self.flags.unreachable {
            return Err(GraderError::Connection("connection refused".to_string()));
        }
        Ok(())
    }

    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        self.specs.lock().unwrap().push(spec.clone());

        if self.flags.failing_create {
            return Err(GraderError::Runtime(format!(
                "No such image: {}",
                spec.image
            )));
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        {
            let mut sandboxes = self.sandboxes.lock().unwrap();
            if sandboxes.values().any(|s| s.name == spec.name) {
                return Err(GraderError::Runtime(format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                )));
            }

            let behavior = self
                .behaviors
                .get(&spec.name)
                .cloned()
                .unwrap_or_else(|| self.default_behavior.clone());
            let (stopped, _) = watch::channel(None);

            sandboxes.insert(
                id.clone(),
                FakeSandbox {
                    name: spec.name.clone(),
                    behavior,
                    started_at: None,
                    stopped,
                },
            );
        }

        if let Some(delay) = self.flags.create_delay {
            tokio::time::sleep(delay).await;
        }

        Ok(SandboxHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start(&self, handle: &SandboxHandle) -> Result<()> {
        let mut sandboxes = self.sandboxes.lock().unwrap();
        let sandbox = sandboxes
            .get_mut(&handle.id)
            .ok_or_else(|| GraderError::Runtime(format!("No such container: {}", handle.id)))?;
        if sandbox.behavior.fail_start {
            return Err(GraderError::Runtime(format!(
                "failed to start {}: exec format error",
                handle.name
            )));
        }
        sandbox.started_at = Some(Instant::now());
        Ok(())
    }

    async fn logs(&self, handle: &SandboxHandle) -> Result<LogStream> {
        let (behavior, started_at, stopped) = self.lookup(handle)?;
        let started_at = started_at
            .ok_or_else(|| GraderError::Runtime(format!("{} is not running", handle.name)))?;

        let (reader, mut writer) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            for chunk in &behavior.chunks {
                if writer.write_all(chunk).await.is_err() {
                    return;
                }
            }
            // Keep the stream open until the sandbox stops.
            let _ = exit_status(&behavior, started_at, stopped).await;
        });

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLogStream {
            inner: reader,
            open: Arc::clone(&self.open_streams),
        }))
    }

    async fn wait(&self, handle: &SandboxHandle) -> Result<i64> {
        if self.flags.failing_wait {
            return Err(GraderError::Runtime(format!(
                "error waiting for container {}: unexpected EOF",
                handle.id
            )));
        }
        let (behavior, started_at, stopped) = self.lookup(handle)?;
        let started_at = started_at
            .ok_or_else(|| GraderError::Runtime(format!("{} is not running", handle.name)))?;
        exit_status(&behavior, started_at, stopped).await
    }

    async fn kill(&self, handle: &SandboxHandle) -> Result<()> {
        if self.flags.failing_kill {
            return Err(GraderError::Runtime(format!(
                "cannot kill container {}: permission denied",
                handle.id
            )));
        }
        let sandboxes = self.sandboxes.lock().unwrap();
        let sandbox = sandboxes
            .get(&handle.id)
            .ok_or_else(|| GraderError::Runtime(format!("No such container: {}", handle.id)))?;
        sandbox.stopped.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(KILLED_STATUS);
                true
            } else {
                false
            }
        });
        self.killed.lock().unwrap().push(handle.name.clone());
        Ok(())
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<()> {
        // The runtime accepts either the id or the name.
        let removed = {
            let mut sandboxes = self.sandboxes.lock().unwrap();
            let key = if sandboxes.contains_key(&handle.id) {
                Some(handle.id.clone())
            } else {
                sandboxes
                    .iter()
                    .find(|(_, s)| s.name == handle.name)
                    .map(|(id, _)| id.clone())
            };
            key.and_then(|key| sandboxes.remove(&key))
        };
        if let Some(sandbox) = removed {
            sandbox.stopped.send_if_modified(|state| {
                if state.is_none() {
                    *state = Some(KILLED_STATUS);
                    true
                } else {
                    false
                }
            });
        }
        if self.flags.failing_remove {
            return Err(GraderError::Runtime(format!(
                "removal of container {} is already in progress",
                handle.id
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Log stream that reports its own drop to the backend
struct FakeLogStream {
    inner: DuplexStream,
    open: Arc<AtomicUsize>,
}

impl AsyncRead for FakeLogStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Drop for FakeLogStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
