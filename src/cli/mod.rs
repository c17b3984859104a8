//! CLI command handling
//!
//! Loads configuration, runs the selected scenarios and prints the results.

use std::path::{Path, PathBuf};

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::lifecycle::ScenarioOutcome;
use crate::testing::{self, ReportOptions, TestScenario};

/// Command-line settings that override the configuration file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub server: Option<PathBuf>,
    pub ready_timeout: Option<u64>,
}

/// Load the configuration file and apply command-line overrides
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = match &overrides.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(server) = &overrides.server {
        config.server.program = server.clone();
    }
    if let Some(secs) = overrides.ready_timeout {
        config.timeouts.ready_secs = secs;
    }

    Ok(config)
}

/// Dispatch a CLI command
///
/// Returns whether every scenario passed.
pub async fn dispatch(command: Commands, config: &Config, options: ReportOptions) -> Result<bool> {
    let cwd = Path::new(".");

    let outcomes = match command {
        Commands::Run { scenarios } => {
            let mut outcomes = Vec::with_capacity(scenarios.len());
            for path in &scenarios {
                tracing::debug!("loading scenario {}", path.display());
                outcomes.push(testing::run_scenario_file(path, config, options).await);
            }
            outcomes
        }

        Commands::Http { client } => {
            let scenario = TestScenario::http(client);
            vec![testing::run_scenario(&scenario, cwd, config, options).await?]
        }

        Commands::Ws { client } => {
            let scenario = TestScenario::ws(client);
            vec![testing::run_scenario(&scenario, cwd, config, options).await?]
        }
    };

    report(&outcomes, options)?;
    Ok(outcomes.iter().all(ScenarioOutcome::passed))
}

fn report(outcomes: &[ScenarioOutcome], options: ReportOptions) -> Result<()> {
    if options.json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
    } else if outcomes.len() > 1 {
        testing::print_summary(outcomes);
    }
    Ok(())
}
