//! Test runner implementation
//!
//! Turns scenarios into plans, runs them one after another and prints a
//! report per scenario.

use std::path::Path;

use colored::Colorize;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::lifecycle::{HarnessSettings, Orchestrator, RunState, ScenarioOutcome, Shutdown};

use super::config::TestScenario;

/// How results are presented
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Machine-readable output; suppresses the human report
    pub json: bool,
    /// Include the captured client output in the report
    pub verbose: bool,
}

/// Run a test scenario from a YAML file
///
/// A file that cannot be loaded or planned yields an errored outcome so the
/// caller can go on with the next scenario.
pub async fn run_scenario_file(
    path: &Path,
    config: &Config,
    options: ReportOptions,
) -> ScenarioOutcome {
    let scenario = match TestScenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => return scenario_error(&path.display().to_string(), &e, options),
    };

    let base = path.parent().unwrap_or(Path::new("."));
    match run_scenario(&scenario, base, config, options).await {
        Ok(outcome) => outcome,
        Err(e) => scenario_error(&scenario.name, &e, options),
    }
}

fn scenario_error(name: &str, error: &Error, options: ReportOptions) -> ScenarioOutcome {
    tracing::warn!("scenario {} not run: {}", name, error);
    let outcome = ScenarioOutcome::errored(name, error);

    if !options.json {
        println!("\n{} {}", "Running Test:".blue().bold(), name.white().bold());
        print_verdict(&outcome);
    }
    outcome
}

/// Run a scenario whose relative paths are anchored at `base`
pub async fn run_scenario(
    scenario: &TestScenario,
    base: &Path,
    config: &Config,
    options: ReportOptions,
) -> Result<ScenarioOutcome> {
    let plan = scenario.plan(config, base)?;

    let mut settings = HarnessSettings::from(config);
    if let Some(ready) = scenario.ready_timeout() {
        settings.ready_timeout = ready;
    }

    if !options.json {
        println!(
            "\n{} {}",
            "Running Test:".blue().bold(),
            scenario.name.white().bold()
        );
        if let Some(desc) = &scenario.description {
            println!("  {}", desc.dimmed());
        }
        println!("  Server: {}", plan.server.display().dimmed());
    }

    let outcome = Orchestrator::new(settings).run(&plan).await;

    if !options.json {
        print_report(&outcome, options.verbose);
    }
    Ok(outcome)
}

/// Print the per-check report for one outcome
pub fn print_report(outcome: &ScenarioOutcome, verbose: bool) {
    println!("\n{}", "Checks:".cyan());

    match outcome.port {
        Some(port) => println!("  {} Server ready on port {}", "✓".green(), port),
        None => println!("  {} Server never became ready", "✗".red()),
    }

    if let Some(exit) = outcome.client_exit {
        if exit.success() {
            println!("  {} Client {}", "✓".green(), exit);
        } else {
            println!("  {} Client {}", "✗".red(), exit);
        }
    }

    if outcome.client_exit.is_some() && outcome.markers_checked > 0 {
        let found = outcome.markers_checked - outcome.missing_markers.len();
        let mark = if outcome.missing_markers.is_empty() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} Content markers: {}/{} found",
            mark, found, outcome.markers_checked
        );
        for missing in &outcome.missing_markers {
            println!("      missing {}", missing.yellow());
        }
    }

    match outcome.server {
        Some(Shutdown::Requested { exit, forced: false }) => {
            println!("  {} Server stopped ({})", "✓".green(), exit)
        }
        Some(Shutdown::Requested { exit, forced: true }) => {
            println!(
                "  {} Server stopped after a forced kill ({})",
                "✓".yellow(),
                exit
            )
        }
        Some(Shutdown::Unrequested { exit }) => {
            println!("  {} Server exited on its own ({})", "✗".red(), exit)
        }
        None => {}
    }

    if verbose && !outcome.client_output.is_empty() {
        println!("\n{}", "Client output:".cyan());
        for line in outcome.client_output.lines() {
            println!("  {}", line.dimmed());
        }
    }

    print_verdict(outcome);
}

fn print_verdict(outcome: &ScenarioOutcome) {
    if outcome.passed() {
        println!(
            "\n{} {}\n",
            "✓".green().bold(),
            "Test Passed".green().bold()
        );
    } else {
        let heading = if outcome.state == RunState::Errored {
            "Test Errored"
        } else {
            "Test Failed"
        };
        println!("\n{} {}", "✗".red().bold(), heading.red().bold());
        for reason in outcome.reasons() {
            println!("  - {}", reason);
        }
        println!();
    }
}

/// Print the final tally across all scenarios
pub fn print_summary(outcomes: &[ScenarioOutcome]) {
    let passed = outcomes.iter().filter(|o| o.passed()).count();
    let failed = outcomes.len() - passed;

    let tally = format!("{} passed, {} failed", passed, failed);
    if failed == 0 {
        println!("{} {}", "Summary:".bold(), tally.green());
    } else {
        println!("{} {}", "Summary:".bold(), tally.red());
        for outcome in outcomes.iter().filter(|o| !o.passed()) {
            println!("  {} {}", "✗".red(), outcome.scenario);
        }
    }
}
