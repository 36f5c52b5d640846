//! Stand-alone CLI entry point for a DAG pipeline run (§4.F/§6): loads a
//! pipeline configuration document, executes it against a fresh [`Bus`],
//! and prints the run summary plus a readback of whichever bus segment a
//! caller names as the terminal result.

use clap::Parser;
use log::info;
use std::path::PathBuf;
use valuation_engine::bus::{bytes_to_f64_vec, Bus};
use valuation_engine::pipeline::{default_registry, PipelineConfig, PipelineRunner, RunStatus};

/// Run a pipeline described by a JSON configuration document.
#[derive(Parser, Debug)]
#[command(name = "run_pipeline", version, about)]
struct Args {
    /// Path to the pipeline configuration JSON (§6).
    config: PathBuf,

    /// Name of a published bus segment to read back and print as a flat
    /// JSON array once the run completes (e.g. `bus://results/npvs`).
    #[arg(long)]
    read_back: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.config)?;
    let config: PipelineConfig = serde_json::from_str(&text)?;

    let bus = Bus::new(config.debug.enable_integrity_checks);
    let registry = default_registry();
    let runner = PipelineRunner::new(&registry);

    let summary = runner.run(&config, &bus, None)?;

    for record in &summary.node_records {
        if record.skipped {
            info!("node '{}' skipped", record.node_id);
        } else {
            info!(
                "node '{}': {:?}, {} rows, {} warnings",
                record.node_id,
                record.final_state,
                record.rows_processed,
                record.warnings.len()
            );
            for warning in &record.warnings {
                info!("  warning: {warning}");
            }
        }
    }

    match summary.status {
        RunStatus::Ok => info!("pipeline run ok ({} nodes skipped)", summary.skipped_count),
        RunStatus::Failed => info!("pipeline run failed"),
    }

    if let Some(name) = &args.read_back {
        // The runner itself has already read back and released every
        // terminal output by the time `run` returns (§8's refcount
        // invariant), so the data comes from the summary, not a live bus
        // lookup -- the segment is gone from the bus by now.
        match summary.terminal_outputs.get(name) {
            Some(bytes) => {
                let values = bytes_to_f64_vec(bytes);
                println!("{}", serde_json::to_string_pretty(&values)?);
            }
            None => {
                info!(
                    "requested read-back segment '{name}' was not captured (not produced, not a \
                     terminal output, or its producing node failed)"
                );
            }
        }
    }

    if summary.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
