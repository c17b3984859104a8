//! The server under test, from launch to shutdown

use std::time::Duration;

use futures_util::FutureExt;

use crate::common::{Error, Result};
use crate::process::{CommandSpec, ProcessEvents, ProcessHandle};

use super::readiness::{ReadinessDetector, ReadinessError};
use super::shutdown::{Shutdown, ShutdownController};
use super::timeout::TimeoutGuard;

/// A launched server together with its readiness and shutdown state
pub struct ManagedServer<P = ProcessHandle> {
    process: P,
    detector: ReadinessDetector,
    shutdown: ShutdownController,
    port: Option<u16>,
}

impl ManagedServer<ProcessHandle> {
    /// Spawn the server process
    pub fn launch(
        spec: &CommandSpec,
        detector: ReadinessDetector,
        stop_grace: Duration,
        drain: Duration,
    ) -> Result<Self> {
        let process = ProcessHandle::spawn(spec, drain)?;
        Ok(Self::new(process, detector, ShutdownController::new(stop_grace)))
    }
}

impl<P: ProcessEvents> ManagedServer<P> {
    pub fn new(process: P, detector: ReadinessDetector, shutdown: ShutdownController) -> Self {
        Self {
            process,
            detector,
            shutdown,
            port: None,
        }
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    /// Port announced by the server, once ready
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Result of the most recent shutdown, including a cleanup after a timeout
    pub fn shutdown_outcome(&self) -> Option<Shutdown> {
        self.shutdown.outcome()
    }

    /// Wait for the readiness announcement
    ///
    /// With a guard, a missed deadline stops the server before
    /// [`Error::ReadinessTimeout`] is returned.
    pub async fn wait_ready(&mut self, guard: Option<&TimeoutGuard>) -> Result<u16> {
        let Some(guard) = guard else {
            return self.detect().await;
        };
        tracing::debug!(
            process = %self.process.label(),
            pattern = %self.detector.pattern(),
            "waiting up to {:?} for readiness",
            guard.duration()
        );

        match guard
            .run(
                self,
                |server| server.detect().boxed(),
                |server| {
                    async move {
                        if let Err(e) = server.stop().await {
                            tracing::warn!(process = %server.process.label(), "cleanup stop failed: {}", e);
                        }
                    }
                    .boxed()
                },
            )
            .await
        {
            Ok(result) => result,
            Err(timed_out) => Err(Error::ReadinessTimeout(timed_out.after)),
        }
    }

    /// Stop the server; see [`ShutdownController::stop`]
    pub async fn stop(&mut self) -> Result<Shutdown> {
        self.shutdown.stop(&mut self.process).await
    }

    async fn detect(&mut self) -> Result<u16> {
        match self.detector.await_ready(&mut self.process).await {
            Ok(port) => {
                self.port = Some(port);
                Ok(port)
            }
            Err(ReadinessError::ExitedBeforeReady(exit)) => Err(Error::ServerExitedEarly(exit)),
            Err(ReadinessError::ProcessFailed(cause)) => {
                Err(Error::process_failed(self.process.label(), &cause))
            }
            Err(ReadinessError::InvalidPort(port)) => Err(Error::InvalidPort(port)),
        }
    }
}
