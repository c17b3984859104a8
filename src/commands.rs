//! CLI command definitions
//!
//! Defines the clap commands for the broker-e2e CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios defined in YAML files, in order
    Run {
        /// Paths to the YAML scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },

    /// Fetch the index page over HTTP and check its content
    Http {
        /// HTTP client executable
        #[arg(long, default_value = "./build/http-client")]
        client: PathBuf,
    },

    /// Run a WebSocket exchange and check the client exit code
    Ws {
        /// WebSocket client executable
        #[arg(long, default_value = "./build/ws")]
        client: PathBuf,
    },
}
