//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Announcement printed by the broker once its HTTP server is bound
pub const DEFAULT_READY_PATTERN: &str = "HTTP listening on port ([0-9]+)";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Server (broker) launch settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Client invocation defaults
    #[serde(default)]
    pub client: ClientDefaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// How to launch the server under test
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server executable, looked up on PATH when it has no separator
    #[serde(default = "default_server_program")]
    pub program: PathBuf,

    /// Arguments requesting an ephemeral port and a port announcement
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,

    /// Regular expression with one capture group for the port
    #[serde(default = "default_ready_pattern")]
    pub ready_pattern: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: default_server_program(),
            args: default_server_args(),
            ready_pattern: default_ready_pattern(),
        }
    }
}

fn default_server_program() -> PathBuf {
    PathBuf::from("pstore-brokerd")
}

fn default_server_args() -> Vec<String> {
    vec!["--http-port=0".to_string(), "--announce-http-port".to_string()]
}

fn default_ready_pattern() -> String {
    DEFAULT_READY_PATTERN.to_string()
}

/// Defaults substituted into client argument templates
#[derive(Debug, Deserialize, Clone)]
pub struct ClientDefaults {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            host: default_host(),
            path: default_path(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_path() -> String {
    "/index.html".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Maximum wait for the readiness announcement
    #[serde(default = "default_ready")]
    pub ready_secs: u64,

    /// Time a server gets to exit after SIGTERM before it is killed
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Maximum client run time, 0 for unbounded
    #[serde(default)]
    pub client_secs: u64,

    /// How long to keep reading output pipes after a process exits
    #[serde(default = "default_output_drain")]
    pub output_drain_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ready_secs: default_ready(),
            stop_grace_secs: default_stop_grace(),
            client_secs: 0,
            output_drain_ms: default_output_drain(),
        }
    }
}

fn default_ready() -> u64 {
    120
}
fn default_stop_grace() -> u64 {
    10
}
fn default_output_drain() -> u64 {
    500
}

impl Timeouts {
    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn client(&self) -> Option<Duration> {
        (self.client_secs > 0).then(|| Duration::from_secs(self.client_secs))
    }

    pub fn output_drain(&self) -> Duration {
        Duration::from_millis(self.output_drain_ms)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
