//! Scenario verdicts
//!
//! A run passes when the client exited zero, every required marker appears
//! in its output, and the server went down only because it was asked to.
//! Each condition that fails contributes its own [`FailureReason`].

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::common::{Error, Result};
use crate::process::ProcessExit;

use super::shutdown::Shutdown;

/// Where a scenario run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ServerStarting,
    ServerReady,
    ClientRunning,
    ServerStopping,
    Done,
    /// Absorbing: a harness-level failure ended the run
    Errored,
}

/// One reason a scenario failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The scenario could not be loaded or turned into a plan
    ScenarioError(String),
    SpawnFailure(String),
    ReadinessTimeout { timeout_secs: u64 },
    ServerExitedBeforeReady(ProcessExit),
    /// Readiness detection failed while the server may still be running
    ReadinessFailure(String),
    ServerAnomaly(String),
    ServerStopFailure(String),
    ClientNonZeroExit(ProcessExit),
    ClientFailure(String),
    ContentValidation { missing: Vec<String> },
}

impl FailureReason {
    /// Failure reason for a fatal error raised while the server was starting
    pub fn from_server_error(error: &Error) -> Self {
        match error {
            Error::SpawnFailure { .. } => FailureReason::SpawnFailure(error.to_string()),
            Error::ReadinessTimeout(after) => FailureReason::ReadinessTimeout {
                timeout_secs: after.as_secs(),
            },
            Error::ServerExitedEarly(exit) => FailureReason::ServerExitedBeforeReady(*exit),
            _ => FailureReason::ReadinessFailure(error.to_string()),
        }
    }

    /// Failure reason for a fatal error raised while the client was running
    pub fn from_client_error(error: &Error) -> Self {
        match error {
            Error::SpawnFailure { .. } => FailureReason::SpawnFailure(error.to_string()),
            _ => FailureReason::ClientFailure(error.to_string()),
        }
    }

    /// Failure reason for a fatal error raised while stopping the server
    pub fn from_stop_error(error: &Error) -> Self {
        match error {
            Error::ServerAnomaly(_) => FailureReason::ServerAnomaly(error.to_string()),
            _ => FailureReason::ServerStopFailure(error.to_string()),
        }
    }

    /// Whether this failure aborted the run rather than failing a check
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FailureReason::ClientNonZeroExit(_) | FailureReason::ContentValidation { .. }
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ScenarioError(detail) => write!(f, "scenario error: {detail}"),
            FailureReason::SpawnFailure(detail) => write!(f, "spawn failure: {detail}"),
            FailureReason::ReadinessTimeout { timeout_secs } => {
                write!(f, "readiness timeout after {timeout_secs}s")
            }
            FailureReason::ServerExitedBeforeReady(exit) => {
                write!(f, "server exited before ready ({exit})")
            }
            FailureReason::ReadinessFailure(detail) => write!(f, "readiness failure: {detail}"),
            FailureReason::ServerAnomaly(detail) => write!(f, "server anomaly: {detail}"),
            FailureReason::ServerStopFailure(detail) => write!(f, "server stop failure: {detail}"),
            FailureReason::ClientNonZeroExit(exit) => write!(f, "client non-zero exit ({exit})"),
            FailureReason::ClientFailure(detail) => write!(f, "client failure: {detail}"),
            FailureReason::ContentValidation { missing } => {
                write!(f, "content validation failure: missing {}", missing.join(", "))
            }
        }
    }
}

/// Patterns that must all appear in the client output
///
/// Every marker is required and each one that does not match is reported.
/// The shell scripts this harness replaces negated the all-match test and
/// failed only when every marker was present; that reading is not kept.
#[derive(Debug, Clone, Default)]
pub struct ContentMarkers {
    markers: Vec<Regex>,
}

impl ContentMarkers {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let markers = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()).map_err(|e| Error::invalid_pattern(p.as_ref(), e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { markers })
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(|m| m.as_str())
    }

    /// Patterns with no match in `output`, in declaration order
    pub fn missing(&self, output: &str) -> Vec<String> {
        self.markers
            .iter()
            .filter(|m| !m.is_match(output))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Everything observed during one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub state: RunState,
    pub port: Option<u16>,
    pub client_exit: Option<ProcessExit>,
    pub client_output: String,
    pub server: Option<Shutdown>,
    pub markers_checked: usize,
    pub missing_markers: Vec<String>,
    pub failures: Vec<FailureReason>,
}

impl ScenarioOutcome {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            state: RunState::Idle,
            port: None,
            client_exit: None,
            client_output: String::new(),
            server: None,
            markers_checked: 0,
            missing_markers: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Outcome for a scenario that never got as far as starting the server
    pub fn errored(scenario: impl Into<String>, error: &Error) -> Self {
        let mut outcome = Self::new(scenario);
        outcome.state = RunState::Errored;
        outcome
            .failures
            .push(FailureReason::ScenarioError(error.to_string()));
        outcome
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.state == RunState::Done
    }

    /// Whether the server died, or failed to stop, outside our control
    pub fn server_anomaly(&self) -> bool {
        self.failures.iter().any(|f| {
            matches!(
                f,
                FailureReason::ServerAnomaly(_) | FailureReason::ServerStopFailure(_)
            )
        })
    }

    /// Record a client exit and check its output against the markers
    pub fn record_client(&mut self, exit: ProcessExit, output: String, markers: &ContentMarkers) {
        if !exit.success() {
            self.failures.push(FailureReason::ClientNonZeroExit(exit));
        }

        self.markers_checked = markers.markers.len();
        let missing = markers.missing(&output);
        if !missing.is_empty() {
            self.missing_markers = missing.clone();
            self.failures.push(FailureReason::ContentValidation { missing });
        }

        self.client_exit = Some(exit);
        self.client_output = output;
    }

    /// Record how the server stopped
    pub fn record_shutdown(&mut self, shutdown: Shutdown) {
        if let Shutdown::Unrequested { exit } = shutdown {
            self.failures.push(FailureReason::ServerAnomaly(format!(
                "server terminated on its own ({exit}) before shutdown was requested"
            )));
        }
        self.server = Some(shutdown);
    }

    /// One line per failed condition
    pub fn reasons(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.to_string()).collect()
    }
}
