//! Scenario orchestration
//!
//! `Idle → ServerStarting → ServerReady → ClientRunning → ServerStopping → Done`,
//! with `Errored` reachable from `ServerStarting` and `ServerStopping`.
//! A run always produces a [`ScenarioOutcome`]; errors become failure
//! reasons instead of escaping.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Instrument;

use crate::common::config::{Config, Timeouts};
use crate::common::{Error, Result};
use crate::process::{CommandSpec, ProcessEvents};

use super::child::ChildRunner;
use super::outcome::{ContentMarkers, FailureReason, RunState, ScenarioOutcome};
use super::readiness::ReadinessDetector;
use super::server::ManagedServer;
use super::timeout::TimeoutGuard;

/// How to invoke a client against the announced port
///
/// Arguments are templates: `{host}`, `{port}` and `{path}` are substituted
/// before launch.
#[derive(Debug, Clone)]
pub struct ClientInvocation {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub host: String,
    pub path: String,
    pub cwd: Option<PathBuf>,
}

impl ClientInvocation {
    /// Default argument template: `<host> <port> <path>`
    pub fn default_args() -> Vec<String> {
        vec!["{host}".to_string(), "{port}".to_string(), "{path}".to_string()]
    }

    /// Concrete command line for a server listening on `port`
    pub fn command(&self, port: u16) -> CommandSpec {
        let port = port.to_string();
        let args = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{host}", &self.host)
                    .replace("{port}", &port)
                    .replace("{path}", &self.path)
            })
            .collect();

        CommandSpec {
            label: self.label.clone(),
            program: self.program.clone(),
            args,
            cwd: self.cwd.clone(),
        }
    }
}

/// Everything needed to run one scenario
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub name: String,
    pub server: CommandSpec,
    pub detector: ReadinessDetector,
    pub client: ClientInvocation,
    pub markers: ContentMarkers,
}

/// Time bounds applied to every run
#[derive(Debug, Clone, Copy)]
pub struct HarnessSettings {
    pub ready_timeout: Duration,
    pub stop_grace: Duration,
    pub client_timeout: Option<Duration>,
    pub output_drain: Duration,
}

impl From<&Timeouts> for HarnessSettings {
    fn from(timeouts: &Timeouts) -> Self {
        Self {
            ready_timeout: timeouts.ready(),
            stop_grace: timeouts.stop_grace(),
            client_timeout: timeouts.client(),
            output_drain: timeouts.output_drain(),
        }
    }
}

impl From<&Config> for HarnessSettings {
    fn from(config: &Config) -> Self {
        Self::from(&config.timeouts)
    }
}

/// Drives one scenario at a time through the server/client lifecycle
pub struct Orchestrator {
    settings: HarnessSettings,
    state: RunState,
}

impl Orchestrator {
    pub fn new(settings: HarnessSettings) -> Self {
        Self {
            settings,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the scenario to a verdict
    pub async fn run(&mut self, plan: &ScenarioPlan) -> ScenarioOutcome {
        let span = tracing::info_span!("scenario", name = %plan.name);
        self.execute(plan).instrument(span).await
    }

    async fn execute(&mut self, plan: &ScenarioPlan) -> ScenarioOutcome {
        self.state = RunState::Idle;
        let mut outcome = ScenarioOutcome::new(&plan.name);

        self.transition(RunState::ServerStarting);
        let mut server = match ManagedServer::launch(
            &plan.server,
            plan.detector.clone(),
            self.settings.stop_grace,
            self.settings.output_drain,
        ) {
            Ok(server) => server,
            Err(e) => {
                outcome.failures.push(FailureReason::from_server_error(&e));
                return self.finish(outcome, RunState::Errored);
            }
        };

        let guard = TimeoutGuard::new(self.settings.ready_timeout);
        let port = match server.wait_ready(Some(&guard)).await {
            Ok(port) => port,
            Err(e) => {
                outcome.failures.push(FailureReason::from_server_error(&e));
                // The timeout path has already run its cleanup stop
                let stopped = matches!(e, Error::ReadinessTimeout(_));
                if stopped || server.process().state().is_terminal() {
                    outcome.server = server.shutdown_outcome();
                } else {
                    match server.stop().await {
                        Ok(shutdown) => outcome.server = Some(shutdown),
                        Err(e) => outcome.failures.push(FailureReason::from_stop_error(&e)),
                    }
                }
                return self.finish(outcome, RunState::Errored);
            }
        };
        outcome.port = Some(port);
        self.transition(RunState::ServerReady);

        self.transition(RunState::ClientRunning);
        let runner = ChildRunner::new(self.settings.output_drain, self.settings.client_timeout);
        match runner.run(&plan.client.command(port)).await {
            Ok(run) => outcome.record_client(run.exit, run.output, &plan.markers),
            Err(e) => outcome
                .failures
                .push(FailureReason::from_client_error(&e)),
        }

        self.transition(RunState::ServerStopping);
        match server.stop().await {
            Ok(shutdown) => outcome.record_shutdown(shutdown),
            Err(e) => {
                outcome.failures.push(FailureReason::from_stop_error(&e));
                return self.finish(outcome, RunState::Errored);
            }
        }

        let terminal = if outcome.server_anomaly() || outcome.failures.iter().any(|f| f.is_fatal()) {
            RunState::Errored
        } else {
            RunState::Done
        };
        self.finish(outcome, terminal)
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(&mut self, mut outcome: ScenarioOutcome, terminal: RunState) -> ScenarioOutcome {
        self.transition(terminal);
        outcome.state = terminal;
        if outcome.passed() {
            tracing::info!("passed");
        } else {
            for reason in outcome.reasons() {
                tracing::error!("{}", reason);
            }
        }
        outcome
    }
}

impl ScenarioPlan {
    /// Assemble a plan, compiling the readiness pattern and content markers
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        server: CommandSpec,
        ready_pattern: &str,
        client: ClientInvocation,
        markers: &[S],
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            server,
            detector: ReadinessDetector::new(ready_pattern)?,
            client,
            markers: ContentMarkers::new(markers)?,
        })
    }
}
