//! broker-e2e - end-to-end test harness for a server and its clients
//!
//! The harness launches a server, detects its readiness announcement,
//! exercises it with a client, validates the client output and shuts the
//! server down, reporting pass or fail.

pub mod cli;
pub mod commands;
pub mod common;
pub mod lifecycle;
pub mod process;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use lifecycle::{Orchestrator, ScenarioOutcome, ScenarioPlan};
