//! Server shutdown
//!
//! Until a stop has been requested, an exit from the server is an anomaly:
//! it died on its own. After the stop request the same event is the expected
//! outcome. The controller tracks which of the two phases it is in, and
//! switches phase in the same step that issues the request.

use std::time::Duration;

use serde::Serialize;

use crate::common::{Error, Result};
use crate::process::{ProcessEvent, ProcessEvents, ProcessExit, ProcessState};

/// How the server ended up stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shutdown {
    /// Exited after we asked it to; `forced` if it needed a kill
    Requested { exit: ProcessExit, forced: bool },
    /// Exited before any stop was requested
    Unrequested { exit: ProcessExit },
}

impl Shutdown {
    pub fn exit(&self) -> ProcessExit {
        match self {
            Shutdown::Requested { exit, .. } | Shutdown::Unrequested { exit } => *exit,
        }
    }

    /// Whether the server went down some way other than a clean requested stop
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Shutdown::Unrequested { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Exit means the server died on its own
    PreKill,
    /// Exit is the answer to our request
    PostKill { forced: bool },
}

/// Stops a server and interprets how it went down
#[derive(Debug)]
pub struct ShutdownController {
    grace: Duration,
    phase: Phase,
    outcome: Option<Shutdown>,
}

impl ShutdownController {
    /// `grace` is how long the server has to exit after each signal
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            phase: Phase::PreKill,
            outcome: None,
        }
    }

    /// The result of an earlier `stop`, if any
    pub fn outcome(&self) -> Option<Shutdown> {
        self.outcome
    }

    /// Stop the process and wait for it to exit
    ///
    /// Calling this again after an outcome is known returns that outcome
    /// without signalling the process again.
    pub async fn stop<P>(&mut self, process: &mut P) -> Result<Shutdown>
    where
        P: ProcessEvents + ?Sized,
    {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }

        match process.state().clone() {
            ProcessState::Exited(exit) => return Ok(self.settle(Shutdown::Unrequested { exit })),
            ProcessState::Failed(cause) => return Err(Error::ServerAnomaly(cause)),
            ProcessState::Running | ProcessState::Stopping => {}
        }

        if self.phase == Phase::PreKill {
            // Anything already queued happened before our request
            while let Some(event) = process.try_next_event() {
                match event {
                    ProcessEvent::Exited(exit) => {
                        tracing::warn!(process = %process.label(), "{} before shutdown was requested", exit);
                        return Ok(self.settle(Shutdown::Unrequested { exit }));
                    }
                    ProcessEvent::Failed(cause) => return Err(Error::ServerAnomaly(cause)),
                    ProcessEvent::Output { .. } => {}
                }
            }

            tracing::info!(process = %process.label(), "stopping");
            process.request_stop();
            self.phase = Phase::PostKill { forced: false };
        }

        loop {
            let forced = matches!(self.phase, Phase::PostKill { forced: true });

            match tokio::time::timeout(self.grace, wait_for_exit(process)).await {
                Ok(Ok(exit)) => {
                    tracing::info!(process = %process.label(), forced, "stopped ({})", exit);
                    return Ok(self.settle(Shutdown::Requested { exit, forced }));
                }
                Ok(Err(cause)) => return Err(Error::process_failed(process.label(), &cause)),
                Err(_) if !forced => {
                    tracing::warn!(
                        process = %process.label(),
                        "still running {:?} after stop request, killing",
                        self.grace
                    );
                    process.force_kill();
                    self.phase = Phase::PostKill { forced: true };
                }
                Err(_) => {
                    return Err(Error::StopTimeout {
                        label: process.label().to_string(),
                        grace: self.grace,
                    })
                }
            }
        }
    }

    fn settle(&mut self, outcome: Shutdown) -> Shutdown {
        self.outcome = Some(outcome);
        outcome
    }
}

/// Skip output until the process reaches a terminal state
async fn wait_for_exit<P>(process: &mut P) -> std::result::Result<ProcessExit, String>
where
    P: ProcessEvents + ?Sized,
{
    while let Some(event) = process.next_event().await {
        match event {
            ProcessEvent::Exited(exit) => return Ok(exit),
            ProcessEvent::Failed(cause) => return Err(cause),
            ProcessEvent::Output { .. } => {}
        }
    }
    Err("output ended without an exit status".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::scripted::ScriptedProcess;

    fn controller() -> ShutdownController {
        ShutdownController::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_requested_stop_is_clean() {
        let mut process = ScriptedProcess::new()
            .stdout("GET /index.html\n")
            .exits_on_stop(0);
        let mut shutdown = controller();

        let outcome = shutdown.stop(&mut process).await.unwrap();
        assert_eq!(
            outcome,
            Shutdown::Requested {
                exit: ProcessExit::with_code(0),
                forced: false
            }
        );
        assert!(!outcome.is_anomaly());
        assert_eq!(process.stop_requests, 1);
    }

    #[tokio::test]
    async fn test_exit_before_request_is_anomaly() {
        let mut process = ScriptedProcess::new().stdout("panic!\n").exits(3);
        let mut shutdown = controller();

        let outcome = shutdown.stop(&mut process).await.unwrap();
        assert_eq!(
            outcome,
            Shutdown::Unrequested {
                exit: ProcessExit::with_code(3)
            }
        );
        assert!(outcome.is_anomaly());
        assert_eq!(process.stop_requests, 0);
    }

    #[tokio::test]
    async fn test_failure_before_request_is_anomaly() {
        let mut process = ScriptedProcess::new().fails("wait failed");
        let err = controller().stop(&mut process).await.unwrap_err();
        assert!(matches!(err, Error::ServerAnomaly(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_failure_after_request_is_error() {
        let mut process = ScriptedProcess::new().fails_on_stop("failed to deliver SIGTERM");
        let err = controller().stop(&mut process).await.unwrap_err();
        assert!(matches!(err, Error::ProcessFailed { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_second_stop_reuses_outcome() {
        let mut process = ScriptedProcess::new().exits_on_stop(0);
        let mut shutdown = controller();

        let first = shutdown.stop(&mut process).await.unwrap();
        let second = shutdown.stop(&mut process).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.exit(), ProcessExit::with_code(0));
        assert_eq!(process.stop_requests, 1);
    }

    #[tokio::test]
    async fn test_already_exited_process_is_not_signalled() {
        let mut process = ScriptedProcess::new().exits(1);
        assert!(process.next_event().await.is_some());

        let mut shutdown = controller();
        let outcome = shutdown.stop(&mut process).await.unwrap();

        assert_eq!(outcome.exit(), ProcessExit::with_code(1));
        assert_eq!(process.stop_requests, 0);
        assert_eq!(process.kills, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_stop_escalates_to_kill() {
        let mut process = ScriptedProcess::new().dies_on_kill();
        let mut shutdown = controller();

        let outcome = shutdown.stop(&mut process).await.unwrap();
        assert_eq!(
            outcome,
            Shutdown::Requested {
                exit: ProcessExit::with_signal(9),
                forced: true
            }
        );
        assert_eq!(process.stop_requests, 1);
        assert_eq!(process.kills, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_process_times_out() {
        let mut process = ScriptedProcess::new();
        let err = controller().stop(&mut process).await.unwrap_err();
        assert!(matches!(err, Error::StopTimeout { .. }), "got {err:?}");
        assert_eq!(process.kills, 1);
    }
}
