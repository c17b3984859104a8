//! broker-e2e - end-to-end harness for the broker and its clients
//!
//! Launches the server, waits for its port announcement, runs a client
//! against it, validates the client output and stops the server.

use std::path::PathBuf;

use broker_e2e::cli::{self, Overrides};
use broker_e2e::commands::Commands;
use broker_e2e::common::logging;
use broker_e2e::testing::ReportOptions;
use clap::Parser;

#[derive(Parser)]
#[command(name = "broker-e2e", about = "End-to-end tests for the broker HTTP server")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server executable, overriding the configuration
    #[arg(long, global = true)]
    server: Option<PathBuf>,

    /// Seconds to wait for the server's port announcement
    #[arg(long, global = true)]
    ready_timeout: Option<u64>,

    /// Debug logging, including all process output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Print outcomes as JSON instead of the report
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match &cli.log_file {
        Some(path) => match logging::init_with_file(path, cli.verbose) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => {
            logging::init_cli(cli.verbose);
            None
        }
    };

    let overrides = Overrides {
        config: cli.config,
        server: cli.server,
        ready_timeout: cli.ready_timeout,
    };
    let options = ReportOptions {
        json: cli.json,
        verbose: cli.verbose,
    };

    let result = match cli::load_config(&overrides) {
        Ok(config) => cli::dispatch(cli.command, &config, options).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            drop(guard);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            drop(guard);
            std::process::exit(1);
        }
    }
}
