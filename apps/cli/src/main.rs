//! RelayCheck CLI
//!
//! Runs the scenario catalogue against a live cluster or an in-process
//! simulated one.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use relaycheck_api::mock::MockClusterConfig;
use relaycheck_harness::{Cluster, ScenarioConfig, ScenarioKind, ScenarioReport, Session};
use relaycheck_settings::{default_settings_path, Settings};

/// RelayCheck - integration checks for relay node clusters
#[derive(Parser)]
#[command(name = "relaycheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value_os_t = default_settings_path())]
    settings: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available scenarios
    List,

    /// Write the default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run scenarios against the configured cluster
    Run {
        /// Scenarios to run (all when empty)
        scenarios: Vec<ScenarioKind>,
    },

    /// Run scenarios against an in-process simulated cluster
    Simulate {
        /// Scenarios to run (all when empty)
        scenarios: Vec<ScenarioKind>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    relaycheck_logging::init_logging(cli.verbose);

    match cli.command {
        Commands::List => {
            list();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { force } => {
            init(&cli.settings, force)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { scenarios } => {
            let settings = load_settings(&cli.settings)?;
            let config = ScenarioConfig::from_settings(&settings.scenario);
            let cluster = Cluster::connect(&settings.cluster, &config.timeouts)
                .await
                .context("Failed to connect to the cluster")?;
            run(cluster, config, &scenarios).await
        }
        Commands::Simulate { scenarios } => {
            let settings = load_settings(&cli.settings)?;
            let config = ScenarioConfig::from_settings(&settings.scenario);
            let mock_config = MockClusterConfig {
                ticket_price: config.ticket_price,
                aggregation_threshold: config.aggregation_threshold,
                ..Default::default()
            };
            let (_mock, cluster) = Cluster::simulated(mock_config)
                .await
                .context("Failed to start the simulated cluster")?;
            run(cluster, config, &scenarios).await
        }
    }
}

fn list() {
    for kind in ScenarioKind::ALL {
        println!("{:<32} {}", kind.name(), kind.summary());
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, use --force to overwrite", path.display());
    }
    Settings::default()
        .save_to(&path.to_path_buf())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    let settings = Settings::load_from(&path.to_path_buf())
        .with_context(|| format!("Failed to load {}", path.display()))?;
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn run(cluster: Cluster, config: ScenarioConfig, scenarios: &[ScenarioKind]) -> Result<ExitCode> {
    let kinds = if scenarios.is_empty() {
        ScenarioKind::ALL.to_vec()
    } else {
        scenarios.to_vec()
    };

    let session = Session::prepare(cluster, config)
        .await
        .context("Cluster is not ready")?;
    info!("Running {} scenarios", kinds.len());

    let reports = session.run_all(&kinds).await;
    print_summary(&reports);

    if reports.iter().all(ScenarioReport::passed) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(reports: &[ScenarioReport]) {
    println!();
    println!("{:<32} {:<6} {:>9}", "Scenario", "Result", "Elapsed");
    println!("{}", "=".repeat(49));
    for report in reports {
        let outcome = if report.passed() { "PASS" } else { "FAIL" };
        println!(
            "{:<32} {:<6} {:>8.1}s",
            report.kind.name(),
            outcome,
            report.elapsed.as_secs_f64()
        );
        if let Err(e) = &report.result {
            println!("    {}", e);
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    println!();
    println!("{} passed, {} failed", reports.len() - failed, failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_with_scenarios() {
        let cli = Cli::try_parse_from(["relaycheck", "run", "n-hop", "ticket-price"]).unwrap();
        match cli.command {
            Commands::Run { scenarios } => {
                assert_eq!(scenarios, vec![ScenarioKind::NHop, ScenarioKind::TicketPrice]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        assert!(Cli::try_parse_from(["relaycheck", "run", "teleport"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["relaycheck", "simulate", "-v", "--settings", "other.json"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.settings, PathBuf::from("other.json"));
    }

    #[test]
    fn test_default_settings_path() {
        let cli = Cli::try_parse_from(["relaycheck", "list"]).unwrap();
        assert_eq!(cli.settings, default_settings_path());
    }
}
