//! Events and state of a managed process

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

/// Which output pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// How a process terminated
///
/// `code` is `None` when the process was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// A normal exit with the given status code
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by a signal
    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// An event observed on a managed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A fragment of output, not necessarily line-aligned
    Output { stream: OutputStream, chunk: String },
    /// The process exited; terminal
    Exited(ProcessExit),
    /// A failure not represented as an exit; terminal
    Failed(String),
}

impl ProcessEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessEvent::Output { .. })
    }
}

/// Lifecycle state of a managed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// A stop request was issued and exit has not been observed yet
    Stopping,
    Exited(ProcessExit),
    Failed(String),
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Failed(_))
    }
}

/// Exclusive access to a running process's events and its kill switch
///
/// Whoever holds `&mut` to an implementor is the only consumer of its events
/// until that borrow ends. Once a terminal event has been returned, both
/// `next_event` and `try_next_event` yield `None` and stop requests are
/// ignored.
#[async_trait]
pub trait ProcessEvents: Send {
    /// Label used in logs and error messages
    fn label(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> &ProcessState;

    /// Wait for the next event
    async fn next_event(&mut self) -> Option<ProcessEvent>;

    /// Take an already-queued event without waiting
    fn try_next_event(&mut self) -> Option<ProcessEvent>;

    /// Ask the process to terminate gracefully
    fn request_stop(&mut self);

    /// Terminate the process immediately
    fn force_kill(&mut self);

    /// The observed exit, once the process has exited
    fn exit(&self) -> Option<ProcessExit> {
        match self.state() {
            ProcessState::Exited(exit) => Some(*exit),
            _ => None,
        }
    }
}
