//! Error types for the harness
//!
//! Fatal errors abort the current scenario. The orchestrator turns every
//! error raised mid-run into a [`FailureReason`](crate::lifecycle::FailureReason)
//! so that a report is always produced.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::process::ProcessExit;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Process Errors ===
    #[error("Failed to launch '{program}': {reason}")]
    SpawnFailure { program: String, reason: String },

    #[error("Process '{label}' failed: {cause}")]
    ProcessFailed { label: String, cause: String },

    // === Server Lifecycle Errors ===
    #[error("Server did not announce readiness within {} seconds", .0.as_secs())]
    ReadinessTimeout(Duration),

    #[error("Server exited before announcing readiness ({0})")]
    ServerExitedEarly(ProcessExit),

    #[error("Server announced an invalid port '{0}'")]
    InvalidPort(String),

    #[error("Server failed before shutdown was requested: {0}")]
    ServerAnomaly(String),

    #[error("Process '{label}' still running {} seconds after a forced kill", .grace.as_secs())]
    StopTimeout { label: String, grace: Duration },

    // === Client Errors ===
    #[error("Client did not finish within {} seconds and was killed", .0.as_secs())]
    ClientTimeout(Duration),

    // === Configuration Errors ===
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a spawn failure for a program that could not be launched
    pub fn spawn_failure(program: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailure {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a process failure error
    pub fn process_failed(label: &str, cause: &str) -> Self {
        Self::ProcessFailed {
            label: label.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }
}
