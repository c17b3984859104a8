//! Scripted process double for unit tests

use std::collections::VecDeque;

use async_trait::async_trait;

use super::events::{OutputStream, ProcessEvent, ProcessEvents, ProcessExit, ProcessState};

/// A process whose events are fed from a script
///
/// When the script runs dry `next_event` never resolves, like a silent
/// process. Stop and kill requests release their own follow-up events.
pub struct ScriptedProcess {
    state: ProcessState,
    script: VecDeque<ProcessEvent>,
    on_stop: VecDeque<ProcessEvent>,
    on_kill: VecDeque<ProcessEvent>,
    pub stop_requests: usize,
    pub kills: usize,
}

impl ScriptedProcess {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Running,
            script: VecDeque::new(),
            on_stop: VecDeque::new(),
            on_kill: VecDeque::new(),
            stop_requests: 0,
            kills: 0,
        }
    }

    pub fn stdout(mut self, chunk: &str) -> Self {
        self.script.push_back(ProcessEvent::Output {
            stream: OutputStream::Stdout,
            chunk: chunk.to_string(),
        });
        self
    }

    pub fn stderr(mut self, chunk: &str) -> Self {
        self.script.push_back(ProcessEvent::Output {
            stream: OutputStream::Stderr,
            chunk: chunk.to_string(),
        });
        self
    }

    pub fn exits(mut self, code: i32) -> Self {
        self.script
            .push_back(ProcessEvent::Exited(ProcessExit::with_code(code)));
        self
    }

    pub fn fails(mut self, cause: &str) -> Self {
        self.script.push_back(ProcessEvent::Failed(cause.to_string()));
        self
    }

    /// Exit with `code` once a graceful stop is requested
    pub fn exits_on_stop(mut self, code: i32) -> Self {
        self.on_stop
            .push_back(ProcessEvent::Exited(ProcessExit::with_code(code)));
        self
    }

    /// Report `cause` once a graceful stop is requested
    pub fn fails_on_stop(mut self, cause: &str) -> Self {
        self.on_stop.push_back(ProcessEvent::Failed(cause.to_string()));
        self
    }

    /// Die from SIGKILL once killed
    pub fn dies_on_kill(mut self) -> Self {
        self.on_kill
            .push_back(ProcessEvent::Exited(ProcessExit::with_signal(9)));
        self
    }

    fn observe(&mut self, event: ProcessEvent) -> ProcessEvent {
        match &event {
            ProcessEvent::Exited(exit) => self.state = ProcessState::Exited(*exit),
            ProcessEvent::Failed(cause) => self.state = ProcessState::Failed(cause.clone()),
            ProcessEvent::Output { .. } => {}
        }
        event
    }
}

#[async_trait]
impl ProcessEvents for ScriptedProcess {
    fn label(&self) -> &str {
        "scripted"
    }

    fn state(&self) -> &ProcessState {
        &self.state
    }

    async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.state.is_terminal() {
            return None;
        }
        match self.script.pop_front() {
            Some(event) => Some(self.observe(event)),
            None => std::future::pending().await,
        }
    }

    fn try_next_event(&mut self) -> Option<ProcessEvent> {
        if self.state.is_terminal() {
            return None;
        }
        let event = self.script.pop_front()?;
        Some(self.observe(event))
    }

    fn request_stop(&mut self) {
        if self.state != ProcessState::Running {
            return;
        }
        self.stop_requests += 1;
        self.state = ProcessState::Stopping;
        self.script.extend(self.on_stop.drain(..));
    }

    fn force_kill(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.kills += 1;
        self.state = ProcessState::Stopping;
        self.script.extend(self.on_kill.drain(..));
    }
}
