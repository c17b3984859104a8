//! E2E scenario runner
//!
//! Reads YAML test scenarios (or builds one of the built-in ones), runs
//! them against the server and client executables, and reports each
//! check with a ✓ or ✗.

mod config;
mod runner;

pub use config::*;
pub use runner::{print_report, print_summary, run_scenario, run_scenario_file, ReportOptions};
