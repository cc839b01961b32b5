mod common;
mod simulation;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{LevelFilter, error, info};
use std::path::{Path, PathBuf};

use common::config::{SimulationConfig, load_config};
use common::results::{ResultRecord, append_record, format_sf_histogram, read_results, reset_results};
use simulation::{ScenarioType, run_simulation};

/// Compare periodic LoRaWAN sending against event-triggered sending with ADR++.
#[derive(Parser, Debug)]
#[command(name = "lora-adr-simulator", version, about)]
struct Cli {
    /// Experiment configuration (.json, or .toml by extension)
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Result file, overriding EXPERIMENT_CONTROL.OUTPUT_FILENAME
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Policies to run for each node count
    #[arg(short, long, value_enum, default_value_t = ScenarioSelection::Both)]
    scenario: ScenarioSelection,

    /// Log every packet outcome
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScenarioSelection {
    Base,
    Modified,
    Both,
}

impl ScenarioSelection {
    fn scenarios(&self) -> &'static [ScenarioType] {
        match self {
            ScenarioSelection::Base => &[ScenarioType::Base],
            ScenarioSelection::Modified => &[ScenarioType::Modified],
            ScenarioSelection::Both => &[ScenarioType::Base, ScenarioType::Modified],
        }
    }
}

/// Run every node count in `NODE_SCENARIOS` under each selected policy.
///
/// The result file is recreated so it starts with a single header.
fn run_experiments(config: &SimulationConfig, output: &Path, scenarios: &[ScenarioType]) -> anyhow::Result<()> {
    reset_results(output)?;

    for &nr_nodes in &config.node_scenarios {
        info!("Scenario: {} nodes", nr_nodes);
        for &scenario in scenarios {
            info!(" -> Running {}", scenario);
            let stats = run_simulation(config, nr_nodes, scenario)
                .with_context(|| format!("{} run with {} nodes failed", scenario, nr_nodes))?;
            append_record(output, &ResultRecord::from_run(config, &stats, scenario))?;
        }
    }

    for record in read_results(output)? {
        info!(
            "{:>8} {:>5} nodes | DER {:.4} | energy {:.4} J | fairness {:.4} | SFs {}",
            record.scenario,
            record.nodes,
            record.der2,
            record.energy,
            record.fairness,
            format_sf_histogram(&record.sf_histogram)
        );
    }
    info!("All experiments finished, results in {}", output.display());
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config).with_context(|| format!("Failed to load configuration: {}", cli.config.display()))?;
    info!("Loaded configuration file: {}", cli.config.display());

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| config.experiment_control.output_filename.clone());
    run_experiments(&config, &output, cli.scenario.scenarios())
}

fn main() {
    let cli = Cli::parse();

    // Logging setup
    let crate_level = if cli.verbose { LevelFilter::Trace } else { LevelFilter::Debug };
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("lora_adr_simulator"), crate_level)
        .init();

    info!("Starting up");

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
