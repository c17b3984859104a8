//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios and
//! the built-in scenarios available without a file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::lifecycle::{ClientInvocation, ScenarioPlan};
use crate::process::CommandSpec;

/// Markers the index page served by the broker must contain
pub const HTTP_MARKERS: [&str; 3] = [
    "<!DOCTYPE html>",
    "<p>Hello from the pstore HTTP server!</p>",
    "</html>",
];

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Overrides for the configured server command
    pub server: Option<ServerOverride>,
    /// The client to run against the server
    pub client: ClientConfig,
    /// What the client output must contain
    #[serde(default)]
    pub expect: Expectations,
    /// Readiness timeout for this scenario only
    pub ready_timeout_secs: Option<u64>,
}

/// Per-scenario server settings; unset fields fall back to the config file
#[derive(Deserialize, Debug, Default)]
pub struct ServerOverride {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub ready_pattern: Option<String>,
}

/// Configuration for the client
#[derive(Deserialize, Debug)]
pub struct ClientConfig {
    /// Path to the client executable
    pub program: PathBuf,
    /// Argument template; `{host}`, `{port}` and `{path}` are substituted
    pub args: Option<Vec<String>>,
    pub host: Option<String>,
    pub path: Option<String>,
}

/// Expectations for the client output
#[derive(Deserialize, Debug, Default)]
pub struct Expectations {
    /// Regular expressions that must all match somewhere in the output
    #[serde(default)]
    pub contains: Vec<String>,
}

impl TestScenario {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse test scenario '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Built-in scenario: fetch the index page and check its content
    pub fn http(client: PathBuf) -> Self {
        Self::builtin(
            "http",
            "fetch the index page over HTTP",
            client,
            HTTP_MARKERS.iter().map(|m| m.to_string()).collect(),
        )
    }

    /// Built-in scenario: run a WebSocket exchange, exit code only
    pub fn ws(client: PathBuf) -> Self {
        Self::builtin("ws", "run a WebSocket exchange", client, Vec::new())
    }

    fn builtin(name: &str, description: &str, program: PathBuf, contains: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            server: None,
            client: ClientConfig {
                program,
                args: None,
                host: None,
                path: None,
            },
            expect: Expectations { contains },
            ready_timeout_secs: None,
        }
    }

    /// The readiness timeout for this scenario, if it overrides the config
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }

    /// Turn the scenario into a runnable plan
    ///
    /// Relative programs named by the scenario that contain a separator are
    /// resolved against `base`, the directory of the scenario file. Programs
    /// from the config file or the command line are used as given.
    pub fn plan(&self, config: &Config, base: &Path) -> Result<ScenarioPlan> {
        let overrides = self.server.as_ref();

        let server_program = overrides
            .and_then(|s| s.program.clone())
            .map(|program| locate(base, program))
            .unwrap_or_else(|| config.server.program.clone());
        let server_args = overrides
            .and_then(|s| s.args.clone())
            .unwrap_or_else(|| config.server.args.clone());
        let ready_pattern = overrides
            .and_then(|s| s.ready_pattern.as_deref())
            .unwrap_or(&config.server.ready_pattern);

        let server = CommandSpec::new("server", server_program, server_args);

        let client = ClientInvocation {
            label: "client".to_string(),
            program: locate(base, self.client.program.clone()),
            args: self
                .client
                .args
                .clone()
                .unwrap_or_else(ClientInvocation::default_args),
            host: self
                .client
                .host
                .clone()
                .unwrap_or_else(|| config.client.host.clone()),
            path: self
                .client
                .path
                .clone()
                .unwrap_or_else(|| config.client.path.clone()),
            cwd: None,
        };

        ScenarioPlan::new(&self.name, server, ready_pattern, client, &self.expect.contains)
    }
}

/// Anchor a relative path-like program at `base`; leave PATH lookups alone
fn locate(base: &Path, program: PathBuf) -> PathBuf {
    if paths::has_separator(&program) {
        paths::resolve_relative(base, &program)
    } else {
        program
    }
}
