//! Client runs
//!
//! A client is launched, its stdout and stderr are collected into one
//! buffer in arrival order, and the run ends when the client exits.

use std::time::Duration;

use futures_util::FutureExt;

use crate::common::{Error, Result};
use crate::process::{CommandSpec, ProcessEvent, ProcessEvents, ProcessExit, ProcessHandle};

use super::timeout::TimeoutGuard;

/// Output and exit status of a finished client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRun {
    /// stdout and stderr interleaved as they arrived
    pub output: String,
    pub exit: ProcessExit,
}

/// Runs client processes to completion
#[derive(Debug, Clone)]
pub struct ChildRunner {
    drain: Duration,
    limit: Option<Duration>,
}

impl ChildRunner {
    /// `drain` is passed to each spawned handle; `limit` bounds each run
    pub fn new(drain: Duration, limit: Option<Duration>) -> Self {
        Self { drain, limit }
    }

    /// Launch the client and wait for it to finish
    pub async fn run(&self, spec: &CommandSpec) -> Result<ClientRun> {
        let mut process = ProcessHandle::spawn(spec, self.drain)?;

        let Some(limit) = self.limit else {
            return collect(&mut process).await;
        };

        let guard = TimeoutGuard::new(limit);
        match guard
            .run(
                &mut process,
                |p| collect(p).boxed(),
                |p| {
                    async move {
                        p.force_kill();
                        while p.next_event().await.is_some() {}
                    }
                    .boxed()
                },
            )
            .await
        {
            Ok(result) => result,
            Err(timed_out) => Err(Error::ClientTimeout(timed_out.after)),
        }
    }
}

/// Accumulate all output until the process exits
pub async fn collect<P>(process: &mut P) -> Result<ClientRun>
where
    P: ProcessEvents + ?Sized,
{
    let mut output = String::new();

    while let Some(event) = process.next_event().await {
        match event {
            ProcessEvent::Output { chunk, .. } => output.push_str(&chunk),
            ProcessEvent::Exited(exit) => {
                tracing::info!(process = %process.label(), "finished ({})", exit);
                return Ok(ClientRun { output, exit });
            }
            ProcessEvent::Failed(cause) => return Err(Error::process_failed(process.label(), &cause)),
        }
    }

    Err(Error::process_failed(
        process.label(),
        "output ended without an exit status",
    ))
}
