//! Stand-alone CLI entry point for a single valuation run (§6): loads a
//! portfolio and assumption tables, generates a scenario matrix, runs the
//! projection kernel across every (policy, scenario) pair, and prints the
//! resulting `ValuationResult` as JSON.

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use valuation_engine::aggregator::{self, AggregatorConfig};
use valuation_engine::assumptions::Assumptions;
use valuation_engine::kernel::KernelConfig;
use valuation_engine::policy::{load_policies, PolicySet, Policy, Gender, ProductType};
use valuation_engine::scenario::{ScenarioConfig, ScenarioGenerator};

/// Run a full valuation: portfolio x scenario matrix, reduced to a single
/// NPV distribution.
#[derive(Parser, Debug)]
#[command(name = "run_valuation", version, about)]
struct Args {
    /// Path to a policy CSV file. Falls back to a small synthetic
    /// portfolio when omitted, for quick smoke runs.
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Directory containing mortality.csv/lapse.csv/expenses.json. Falls
    /// back to synthetic assumption tables when omitted.
    #[arg(long)]
    assumptions: Option<PathBuf>,

    /// JSON file holding a `ScenarioConfig`. Falls back to a small
    /// deterministic default when omitted.
    #[arg(long)]
    scenario_config: Option<PathBuf>,

    /// Number of worker threads driving the aggregator's pinned pool.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Retain the full per-scenario NPV vector in the JSON output.
    #[arg(long)]
    distribution: bool,
}

fn load_scenario_config(path: Option<&PathBuf>) -> anyhow::Result<ScenarioConfig> {
    let config = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)?;
            serde_json::from_str(&text)?
        }
        None => ScenarioConfig {
            model: valuation_engine::scenario::RateModel::Vasicek,
            outer_paths: 5,
            inner_paths_per_outer: 200,
            projection_years: 30,
            seed: 42,
            yield_curve: valuation_engine::scenario::YieldCurveParams {
                r0: 0.04,
                mean_reversion_speed: 0.1,
                volatility: 0.015,
                version: "default-v1".to_string(),
            },
        },
    };
    config.validate()?;
    Ok(config)
}

fn synthetic_demo_policies() -> PolicySet {
    PolicySet::new(vec![
        Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap(),
        Policy::new(2, 45, Gender::Female, 250_000.0, 1_200.0, 15, ProductType::WholeLife).unwrap(),
        Policy::new(3, 50, Gender::Male, 150_000.0, 900.0, 10, ProductType::Endowment).unwrap(),
    ])
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let policies = match &args.policies {
        Some(path) => load_policies(path)?,
        None => {
            info!("no --policies given, using synthetic demo portfolio");
            synthetic_demo_policies()
        }
    };
    info!("loaded {} policies", policies.len());

    let assumptions = match &args.assumptions {
        Some(dir) => Assumptions::from_directory(dir)?,
        None => {
            info!("no --assumptions given, using synthetic defaults");
            Assumptions::synthetic_default()
        }
    };

    let scenario_config = load_scenario_config(args.scenario_config.as_ref())?;
    info!(
        "generating {} scenarios over {} years",
        scenario_config.total_scenarios(),
        scenario_config.projection_years
    );
    let scenarios = ScenarioGenerator::generate(&scenario_config)?;

    let aggregator_config = AggregatorConfig {
        worker_count: args.workers,
        kernel_config: KernelConfig::default(),
        store_distribution: args.distribution,
    };
    let cancel = AtomicBool::new(false);
    let (result, warnings) = aggregator::run(&policies, &assumptions, &scenarios, &aggregator_config, None, &cancel)?;

    info!(
        "valuation complete in {:?}: {} scenarios, {} numeric warnings, {} udf warnings",
        start.elapsed(),
        result.scenario_count,
        warnings.numeric.len(),
        warnings.udf_warning_count
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
