//! Spawned process with an event stream
//!
//! Each handle owns a supervisor task that waits for the child and applies
//! stop requests, plus one pump task per output pipe. All of them report to
//! the handle through a single channel, so output written before exit is
//! always delivered before the exit event.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{paths, Error, Result};

use super::decode::ChunkDecoder;
use super::events::{OutputStream, ProcessEvent, ProcessEvents, ProcessExit, ProcessState};

/// Size of a single pipe read
const READ_BUFFER_SIZE: usize = 4096;

/// A command line to launch
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Name used in logs and reports
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory for the process
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args,
            cwd: None,
        }
    }

    /// Resolve the executable to launch
    ///
    /// Bare names are looked up on PATH; anything with a separator is
    /// taken relative to the working directory.
    pub fn resolve(&self) -> Result<PathBuf> {
        if paths::has_separator(&self.program) || self.program.is_absolute() {
            let path = match &self.cwd {
                Some(dir) => paths::resolve_relative(dir, &self.program),
                None => self.program.clone(),
            };
            return path
                .canonicalize()
                .map_err(|e| Error::spawn_failure(path.display(), e));
        }

        which::which(&self.program)
            .map_err(|e| Error::spawn_failure(self.program.display(), format!("not found on PATH ({e})")))
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Requests forwarded to the supervisor task
#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
    Kill,
}

/// A running OS process owned by exactly one component
pub struct ProcessHandle {
    label: String,
    pid: Option<u32>,
    state: ProcessState,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    control: mpsc::UnboundedSender<Control>,
    stop_requests: usize,
}

impl ProcessHandle {
    /// Launch a process with piped output
    ///
    /// `drain` bounds how long the exit event waits for the output pipes to
    /// close after the process itself has exited.
    pub fn spawn(spec: &CommandSpec, drain: Duration) -> Result<Self> {
        let program = spec.resolve()?;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failure(program.display(), e))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal(format!("Failed to get {} stdout", spec.label)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal(format!("Failed to get {} stderr", spec.label)))?;

        tracing::info!(process = %spec.label, pid = ?pid, "started {}", spec.display());

        let (event_tx, events) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();

        let pumps = vec![
            tokio::spawn(pump(
                spec.label.clone(),
                OutputStream::Stdout,
                stdout,
                event_tx.clone(),
            )),
            tokio::spawn(pump(
                spec.label.clone(),
                OutputStream::Stderr,
                stderr,
                event_tx.clone(),
            )),
        ];
        tokio::spawn(supervise(
            spec.label.clone(),
            child,
            pumps,
            control_rx,
            event_tx,
            drain,
        ));

        Ok(Self {
            label: spec.label.clone(),
            pid,
            state: ProcessState::Running,
            events,
            control,
            stop_requests: 0,
        })
    }

    /// OS process id, if the process was still running when spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Number of graceful stop requests actually sent to the process
    pub fn stop_requests(&self) -> usize {
        self.stop_requests
    }

    fn observe(&mut self, event: Option<ProcessEvent>) -> Option<ProcessEvent> {
        // The supervisor always sends a terminal event before hanging up, so a
        // closed channel means it died.
        let event = event.unwrap_or_else(|| ProcessEvent::Failed("process supervisor exited".to_string()));

        match &event {
            ProcessEvent::Exited(exit) => {
                tracing::debug!(process = %self.label, "{}", exit);
                self.state = ProcessState::Exited(*exit);
            }
            ProcessEvent::Failed(cause) => {
                tracing::warn!(process = %self.label, "{}", cause);
                self.state = ProcessState::Failed(cause.clone());
            }
            ProcessEvent::Output { .. } => {}
        }
        Some(event)
    }

    fn send(&self, request: Control) {
        if self.control.send(request).is_err() {
            tracing::debug!(process = %self.label, "supervisor gone, {:?} dropped", request);
        }
    }
}

#[async_trait]
impl ProcessEvents for ProcessHandle {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> &ProcessState {
        &self.state
    }

    async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.state.is_terminal() {
            return None;
        }
        let event = self.events.recv().await;
        self.observe(event)
    }

    fn try_next_event(&mut self) -> Option<ProcessEvent> {
        if self.state.is_terminal() {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => self.observe(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => self.observe(None),
        }
    }

    fn request_stop(&mut self) {
        if self.state != ProcessState::Running {
            return;
        }
        tracing::debug!(process = %self.label, "requesting stop");
        self.send(Control::Terminate);
        self.stop_requests += 1;
        self.state = ProcessState::Stopping;
    }

    fn force_kill(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(process = %self.label, "killing");
        self.send(Control::Kill);
        self.state = ProcessState::Stopping;
    }
}

/// Forward one output pipe as chunk events until EOF
async fn pump<R>(
    label: String,
    stream: OutputStream,
    mut reader: R,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = ChunkDecoder::default();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(process = %label, stream = stream.as_str(), "read failed: {}", e);
                break;
            }
        };
        emit(&label, stream, decoder.push(&buf[..n]), &events);
    }

    emit(&label, stream, decoder.finish(), &events);
}

fn emit(
    label: &str,
    stream: OutputStream,
    chunk: String,
    events: &mpsc::UnboundedSender<ProcessEvent>,
) {
    if chunk.is_empty() {
        return;
    }
    tracing::debug!(process = %label, stream = stream.as_str(), "{}", chunk.trim_end());
    // Nobody listening any more is fine; keep draining so the child never blocks
    let _ = events.send(ProcessEvent::Output { stream, chunk });
}

/// Wait for the child, apply stop requests, and report exactly one terminal event
async fn supervise(
    label: String,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    drain: Duration,
) {
    let mut detached = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = control.recv(), if !detached => match request {
                Some(Control::Terminate) => {
                    if let Err(cause) = signal_terminate(&mut child) {
                        // Dropping the child kills it (kill_on_drop)
                        let _ = events.send(ProcessEvent::Failed(cause));
                        return;
                    }
                }
                Some(Control::Kill) => {
                    if let Err(e) = child.start_kill() {
                        let _ = events.send(ProcessEvent::Failed(format!("failed to kill: {e}")));
                        return;
                    }
                }
                None => {
                    // Handle dropped: nobody will ever ask for a stop, so stop now
                    detached = true;
                    let _ = child.start_kill();
                }
            },
        }
    };

    let deadline = tokio::time::Instant::now() + drain;
    for pump in pumps {
        if tokio::time::timeout_at(deadline, pump).await.is_err() {
            tracing::debug!(process = %label, "output still open {:?} after exit", drain);
        }
    }

    let event = match status {
        Ok(status) => ProcessEvent::Exited(ProcessExit::from(status)),
        Err(e) => ProcessEvent::Failed(format!("failed to wait for exit: {e}")),
    };
    let _ = events.send(event);
}

/// Send SIGTERM, treating an already-gone process as success
#[cfg(unix)]
fn signal_terminate(child: &mut Child) -> std::result::Result<(), String> {
    let Some(pid) = child.id() else {
        return Ok(());
    };

    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(format!("failed to deliver SIGTERM to pid {pid}: {err}"))
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) -> std::result::Result<(), String> {
    child
        .start_kill()
        .map_err(|e| format!("failed to terminate: {e}"))
}
