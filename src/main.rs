use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Builder;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use dv_router::config::Scenario;
use dv_router::report::Report;
use dv_router::Simulator;

#[derive(Parser)]
#[command(name = "dv-router", version, about = "Distance vector routing simulator")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario on the deterministic event simulator
    Simulate {
        scenario: PathBuf,

        /// Poison reverse on every router, whatever the file says
        #[arg(long)]
        poison: bool,

        /// Stop at this time instead of the scenario's duration
        #[arg(long)]
        until: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a scenario with one tokio task per node and real timers
    Live {
        scenario: PathBuf,

        /// Wall-clock milliseconds per scenario second
        #[arg(long, default_value_t = 100)]
        time_scale_ms: u64,

        #[arg(long)]
        poison: bool,

        #[arg(long)]
        json: bool,
    },
    /// Print an example scenario
    Sample,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Simulate {
            scenario,
            poison,
            until,
            json,
        } => {
            let mut scenario = load(&scenario, poison)?;
            if let Some(until) = until {
                scenario.duration = until;
            }
            let report = Simulator::run_scenario(&scenario)?;
            print(&report, json)
        }
        Command::Live {
            scenario,
            time_scale_ms,
            poison,
            json,
        } => {
            let scenario = load(&scenario, poison)?;
            let rt = Builder::new_multi_thread().enable_all().build()?;
            let report = rt.block_on(dv_router::live::run(
                &scenario,
                Duration::from_millis(time_scale_ms),
            ))?;
            print(&report, json)
        }
        Command::Sample => {
            println!("{}", Scenario::sample().to_json()?);
            Ok(())
        }
    }
}

fn load(path: &Path, poison: bool) -> Result<Scenario> {
    let mut scenario = Scenario::load(path)
        .with_context(|| format!("Failed to load scenario {}", path.display()))?;
    if poison {
        scenario.force_poison();
    }
    info!(
        routers = scenario.routers.len(),
        hosts = scenario.hosts.len(),
        hubs = scenario.hubs.len(),
        links = scenario.links.len(),
        "loaded {}",
        path.display()
    );
    Ok(scenario)
}

fn print(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}
