//! End-to-end integration tests for the harness
//!
//! These tests drive the real process machinery against the `mock-broker`
//! and `mock-client` fixture binaries:
//! 1. Library runs of each scenario shape (happy path and every failure mode)
//! 2. CLI runs of the `broker-e2e` binary with YAML scenario files

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use broker_e2e::common::config::DEFAULT_READY_PATTERN;
use broker_e2e::lifecycle::{
    ClientInvocation, FailureReason, HarnessSettings, Orchestrator, RunState, ScenarioOutcome,
    ScenarioPlan, Shutdown,
};
use broker_e2e::process::{CommandSpec, ProcessExit};

const MOCK_BROKER: &str = env!("CARGO_BIN_EXE_mock-broker");
const MOCK_CLIENT: &str = env!("CARGO_BIN_EXE_mock-client");
const HARNESS: &str = env!("CARGO_BIN_EXE_broker-e2e");

const SIGKILL: i32 = 9;

const HTTP_MARKERS: [&str; 3] = [
    "<!DOCTYPE html>",
    "<p>Hello from the pstore HTTP server!</p>",
    "</html>",
];

/// One scenario against the fixture binaries
struct TestContext {
    broker_args: Vec<String>,
    client_args: Vec<String>,
    client_program: PathBuf,
    server_program: PathBuf,
    markers: Vec<&'static str>,
    settings: HarnessSettings,
}

impl TestContext {
    fn new() -> Self {
        Self {
            broker_args: vec!["--http-port=0".into(), "--announce-http-port".into()],
            client_args: Vec::new(),
            client_program: PathBuf::from(MOCK_CLIENT),
            server_program: PathBuf::from(MOCK_BROKER),
            markers: HTTP_MARKERS.to_vec(),
            settings: HarnessSettings {
                ready_timeout: Duration::from_secs(10),
                stop_grace: Duration::from_secs(2),
                client_timeout: Some(Duration::from_secs(10)),
                output_drain: Duration::from_millis(500),
            },
        }
    }

    fn broker(mut self, args: &[&str]) -> Self {
        self.broker_args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    fn client(mut self, args: &[&str]) -> Self {
        self.client_args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    fn plan(&self, name: &str) -> ScenarioPlan {
        let mut args = ClientInvocation::default_args();
        args.extend(self.client_args.iter().cloned());

        let client = ClientInvocation {
            label: "client".to_string(),
            program: self.client_program.clone(),
            args,
            host: "127.0.0.1".to_string(),
            path: "/index.html".to_string(),
            cwd: None,
        };
        let server = CommandSpec::new("server", &self.server_program, self.broker_args.clone());

        ScenarioPlan::new(name, server, DEFAULT_READY_PATTERN, client, &self.markers)
            .expect("valid plan")
    }

    async fn run(&self, name: &str) -> ScenarioOutcome {
        Orchestrator::new(self.settings).run(&self.plan(name)).await
    }
}

fn clean_stop(outcome: &ScenarioOutcome) -> bool {
    matches!(outcome.server, Some(Shutdown::Requested { forced: false, .. }))
}

// ============== Library scenarios ==============

#[tokio::test]
async fn test_happy_path_passes() {
    let outcome = TestContext::new().run("happy").await;

    assert!(outcome.passed(), "failures: {:?}", outcome.reasons());
    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome.port.is_some_and(|p| p > 0));
    assert_eq!(outcome.client_exit, Some(ProcessExit::with_code(0)));
    assert!(outcome.client_output.contains("Hello from the pstore HTTP server!"));
    assert!(clean_stop(&outcome), "server: {:?}", outcome.server);
}

#[tokio::test]
async fn test_announcement_split_across_writes() {
    let ctx = TestContext::new().broker(&["--split-announcement"]);
    let outcome = ctx.run("split").await;

    assert!(outcome.passed(), "failures: {:?}", outcome.reasons());
    assert!(outcome.port.is_some_and(|p| p >= 1024));
}

#[tokio::test]
async fn test_unterminated_announcement_is_ready() {
    let ctx = TestContext::new().broker(&["--no-newline"]);
    let outcome = ctx.run("no-newline").await;

    assert!(outcome.passed(), "failures: {:?}", outcome.reasons());
    assert!(outcome.port.is_some_and(|p| p > 0));
}

#[tokio::test]
async fn test_out_of_range_port_stops_server_gracefully() {
    let outcome = TestContext::new()
        .broker(&["--announce-port", "70000"])
        .run("bad-port")
        .await;

    assert_eq!(outcome.state, RunState::Errored);
    assert!(
        matches!(outcome.failures[..], [FailureReason::ReadinessFailure(_)]),
        "failures: {:?}",
        outcome.failures
    );
    assert!(outcome.reasons()[0].contains("70000"));
    assert!(!outcome.server_anomaly());
    assert!(outcome.client_exit.is_none());
    assert!(clean_stop(&outcome), "server: {:?}", outcome.server);
}

#[tokio::test]
async fn test_client_non_zero_exit() {
    let outcome = TestContext::new()
        .client(&["--exit-code", "1"])
        .run("client-fails")
        .await;

    assert!(!outcome.passed());
    assert_eq!(outcome.state, RunState::Done);
    assert!(outcome
        .failures
        .contains(&FailureReason::ClientNonZeroExit(ProcessExit::with_code(1))));
    assert!(outcome.reasons()[0].contains("client non-zero exit"));
    assert!(!outcome.server_anomaly());
    assert!(clean_stop(&outcome));
}

#[tokio::test]
async fn test_missing_closing_marker() {
    let outcome = TestContext::new()
        .client(&["--truncate"])
        .run("truncated")
        .await;

    assert!(!outcome.passed());
    assert_eq!(outcome.missing_markers, vec!["</html>".to_string()]);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.reasons()[0].starts_with("content validation failure"));
    assert!(clean_stop(&outcome));
}

#[tokio::test]
async fn test_silent_server_times_out_and_is_stopped() {
    let mut ctx = TestContext::new().broker(&["--silent"]);
    ctx.settings.ready_timeout = Duration::from_secs(1);
    let outcome = ctx.run("silent").await;

    assert_eq!(outcome.state, RunState::Errored);
    assert_eq!(
        outcome.failures,
        vec![FailureReason::ReadinessTimeout { timeout_secs: 1 }]
    );
    assert!(outcome.reasons()[0].contains("readiness timeout"));
    assert!(outcome.client_exit.is_none());
    assert!(clean_stop(&outcome), "cleanup stop: {:?}", outcome.server);
}

#[tokio::test]
async fn test_server_exits_before_ready() {
    let outcome = TestContext::new()
        .broker(&["--exit-before-ready", "1"])
        .run("early-exit")
        .await;

    assert_eq!(outcome.state, RunState::Errored);
    assert_eq!(
        outcome.failures,
        vec![FailureReason::ServerExitedBeforeReady(ProcessExit::with_code(1))]
    );
    assert!(outcome.reasons()[0].contains("server exited before ready"));
    assert!(!outcome.reasons()[0].contains("timeout"));
}

#[tokio::test]
async fn test_server_ignoring_sigterm_is_killed() {
    let mut ctx = TestContext::new().broker(&["--ignore-sigterm"]);
    ctx.settings.stop_grace = Duration::from_millis(500);
    let outcome = ctx.run("stubborn").await;

    assert!(outcome.passed(), "failures: {:?}", outcome.reasons());
    assert_eq!(
        outcome.server,
        Some(Shutdown::Requested {
            exit: ProcessExit::with_signal(SIGKILL),
            forced: true
        })
    );
}

#[tokio::test]
async fn test_server_dying_during_client_run_is_anomaly() {
    let outcome = TestContext::new()
        .broker(&["--die-after-ms", "300"])
        .client(&["--sleep-ms", "1500"])
        .run("dies")
        .await;

    assert!(!outcome.passed());
    assert_eq!(outcome.state, RunState::Errored);
    assert!(outcome.server_anomaly());
    assert_eq!(
        outcome.server,
        Some(Shutdown::Unrequested {
            exit: ProcessExit::with_code(3)
        })
    );
    assert_eq!(outcome.client_exit, Some(ProcessExit::with_code(0)));
}

#[tokio::test]
async fn test_missing_server_executable() {
    let mut ctx = TestContext::new();
    ctx.server_program = PathBuf::from("/nonexistent/pstore-brokerd");
    let outcome = ctx.run("no-server").await;

    assert_eq!(outcome.state, RunState::Errored);
    assert!(matches!(outcome.failures[..], [FailureReason::SpawnFailure(_)]));
    assert!(outcome.port.is_none());
}

#[tokio::test]
async fn test_missing_client_still_stops_server() {
    let mut ctx = TestContext::new();
    ctx.client_program = PathBuf::from("/nonexistent/http-client");
    let outcome = ctx.run("no-client").await;

    assert_eq!(outcome.state, RunState::Errored);
    assert!(matches!(outcome.failures[..], [FailureReason::SpawnFailure(_)]));
    assert!(clean_stop(&outcome));
}

// ============== CLI runs ==============

/// Write a config and scenario into `dir` and run the harness on them
fn run_cli(dir: &Path, client_flags: &str, extra: &[&str]) -> Output {
    let (config, scenario) = write_fixtures(dir, client_flags);
    harness(&config, extra, &[scenario])
}

/// Write `config.toml` and `http.yaml` into `dir`
fn write_fixtures(dir: &Path, client_flags: &str) -> (PathBuf, PathBuf) {
    let config = dir.join("config.toml");
    std::fs::write(
        &config,
        "[timeouts]\nready_secs = 10\nstop_grace_secs = 2\nclient_secs = 10\n",
    )
    .unwrap();

    let scenario = dir.join("http.yaml");
    std::fs::write(
        &scenario,
        format!(
            r#"
name: cli-http
description: fetch the index page through the CLI
server:
  program: {broker}
client:
  program: {client}
  args: ["{{host}}", "{{port}}", "{{path}}"{client_flags}]
  host: 127.0.0.1
expect:
  contains:
    - "<!DOCTYPE html>"
    - "<p>Hello from the pstore HTTP server!</p>"
    - "</html>"
"#,
            broker = MOCK_BROKER,
            client = MOCK_CLIENT,
        ),
    )
    .unwrap();

    (config, scenario)
}

fn harness(config: &Path, extra: &[&str], scenarios: &[PathBuf]) -> Output {
    Command::new(HARNESS)
        .arg("--config")
        .arg(config)
        .args(extra)
        .arg("run")
        .args(scenarios)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run broker-e2e")
}

#[test]
fn test_cli_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), "", &["--json"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    let outcomes: serde_json::Value = serde_json::from_str(&stdout).expect("JSON report");
    assert_eq!(outcomes[0]["scenario"], "cli-http");
    assert_eq!(outcomes[0]["state"], "done");
    assert_eq!(outcomes[0]["failures"].as_array().map(Vec::len), Some(0));
    assert_eq!(outcomes[0]["server"]["kind"], "requested");
}

#[test]
fn test_cli_failure_sets_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), r#", "--truncate""#, &[]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout: {}", stdout);
    assert!(stdout.contains("Test Failed"));
    assert!(stdout.contains("content validation failure: missing </html>"));
}

#[test]
fn test_cli_unloadable_scenario_keeps_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let (config, scenario) = write_fixtures(dir.path(), "");
    let missing = dir.path().join("missing.yaml");

    let output = harness(&config, &["--json"], &[scenario, missing]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout: {}", stdout);

    let outcomes: serde_json::Value = serde_json::from_str(&stdout).expect("JSON report");
    assert_eq!(outcomes.as_array().map(Vec::len), Some(2));
    assert_eq!(outcomes[0]["scenario"], "cli-http");
    assert_eq!(outcomes[0]["state"], "done");
    assert_eq!(outcomes[1]["state"], "errored");
    assert_eq!(outcomes[1]["failures"][0]["kind"], "scenario_error");
}

#[test]
fn test_cli_missing_config_file() {
    let output = Command::new(HARNESS)
        .args(["--config", "/nonexistent/config.toml", "run", "missing.yaml"])
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run broker-e2e");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error:"));
}
