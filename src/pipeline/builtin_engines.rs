//! The core's own two engines, wired into the pipeline's native ABI
//! (§4.F/§6): `scenario_generator` drives §4.B over a bus segment, and
//! `projection_aggregator` drives §4.C/§4.D over the scenario segment it
//! consumes. Registered by name in [`super::default_registry`].

use super::engine_trait::{ChunkOutcome, Credentials, Engine, EngineConfig, EngineInfo};
use crate::aggregator::{self, AggregatorConfig};
use crate::assumptions::Assumptions;
use crate::bus::Bus;
use crate::error::EngineError;
use crate::policy::PolicySet;
use crate::scenario::{ScenarioConfig, ScenarioGenerator, ScenarioMatrix};
use log::info;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Read the consumer count the executor injected under
/// `__bus_consumers__[output_name]` (see `executor::inject_consumer_counts`)
/// out of the raw config handed to `initialize`, defaulting to one -- the
/// pipeline caller itself -- for an output the map doesn't mention.
fn extract_consumers(config: &EngineConfig) -> HashMap<String, u32> {
    config
        .get("__bus_consumers__")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as u32)))
                .collect()
        })
        .unwrap_or_default()
}

/// §4.B's scenario generator, wrapped as a pipeline node: reads a
/// [`ScenarioConfig`] from the node's JSON config and writes the resulting
/// `(N x projection_years)` rate matrix to its single declared output.
pub struct ScenarioGeneratorEngine {
    config: Option<ScenarioConfig>,
    consumers: HashMap<String, u32>,
}

impl ScenarioGeneratorEngine {
    pub fn new() -> Self {
        Self { config: None, consumers: HashMap::new() }
    }
}

impl Default for ScenarioGeneratorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScenarioGeneratorEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "scenario_generator".to_string(),
            version: "1.0".to_string(),
            engine_type: "esg".to_string(),
            supports_am: false,
            max_buffer_size: usize::MAX,
        }
    }

    fn initialize(&mut self, config: &EngineConfig, _credentials: Option<&Credentials>) -> Result<(), EngineError> {
        self.consumers = extract_consumers(config);

        let mut object = serde_json::Map::new();
        for (k, v) in config {
            if k != "__bus_consumers__" {
                object.insert(k.clone(), v.clone());
            }
        }
        let parsed: ScenarioConfig = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| EngineError::Configuration {
                message: format!("invalid scenario_generator config: {e}"),
                path: None,
            })?;
        parsed.validate()?;
        self.config = Some(parsed);
        Ok(())
    }

    fn run_chunk(&mut self, bus: &Bus, _inputs: &[String], outputs: &[String]) -> ChunkOutcome {
        let start = Instant::now();
        let config = match &self.config {
            Some(c) => c,
            None => return ChunkOutcome::failed("scenario_generator: not initialized", 0),
        };
        let output_name = match outputs.first() {
            Some(n) => n,
            None => return ChunkOutcome::failed("scenario_generator requires one declared output", 0),
        };

        let rows = config.total_scenarios() as usize;
        let cols = config.projection_years as usize;
        let consumers = self.consumers.get(output_name).copied().unwrap_or(1);

        let handle = match bus.allocate(output_name, &[rows, cols], std::mem::size_of::<f64>(), consumers) {
            Ok(h) => h,
            Err(e) => return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };

        let write_result = bus.write_region::<f64, _>(&handle, |slice| ScenarioGenerator::generate_into(config, slice));
        let generate_result = match write_result {
            Ok(inner) => inner,
            Err(e) => return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };
        if let Err(e) = generate_result {
            return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64);
        }

        if let Err(e) = bus.publish(&handle) {
            return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64);
        }

        info!("scenario_generator wrote {rows} scenarios x {cols} years to {output_name}");
        ChunkOutcome::ok(rows as u64, (rows * cols * std::mem::size_of::<f64>()) as u64, start.elapsed().as_millis() as u64)
    }

    fn dispose(&mut self) {}
}

/// §4.C/§4.D's projection kernel and valuation aggregator, wrapped as a
/// pipeline node: consumes a scenario-rate bus segment (its single
/// declared input) and writes the resulting per-scenario NPV vector to its
/// single declared output. Policies and assumption tables are loaded once
/// at `initialize` time from paths in the node's config, per §1's "the
/// core only sees resolved numeric tables" -- file/HTTP resolution is the
/// surrounding loader's job, not this engine's.
pub struct ProjectionAggregatorEngine {
    policies: Option<PolicySet>,
    assumptions: Option<Assumptions>,
    worker_count: usize,
    consumers: HashMap<String, u32>,
}

impl ProjectionAggregatorEngine {
    pub fn new() -> Self {
        Self { policies: None, assumptions: None, worker_count: 1, consumers: HashMap::new() }
    }
}

impl Default for ProjectionAggregatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(serde::Deserialize, Default)]
struct ProjectionAggregatorConfig {
    policies_path: Option<String>,
    assumptions_path: Option<String>,
    #[serde(default = "default_worker_count")]
    worker_count: usize,
}

fn default_worker_count() -> usize {
    1
}

impl Engine for ProjectionAggregatorEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "projection_aggregator".to_string(),
            version: "1.0".to_string(),
            engine_type: "valuation".to_string(),
            supports_am: false,
            max_buffer_size: usize::MAX,
        }
    }

    fn initialize(&mut self, config: &EngineConfig, _credentials: Option<&Credentials>) -> Result<(), EngineError> {
        self.consumers = extract_consumers(config);

        let mut object = serde_json::Map::new();
        for (k, v) in config {
            if k != "__bus_consumers__" {
                object.insert(k.clone(), v.clone());
            }
        }
        let parsed: ProjectionAggregatorConfig = serde_json::from_value(serde_json::Value::Object(object))
            .unwrap_or_default();

        self.policies = Some(match &parsed.policies_path {
            Some(path) => crate::policy::load_policies(path)?,
            None => synthetic_demo_policies(),
        });
        self.assumptions = Some(match &parsed.assumptions_path {
            Some(path) => Assumptions::from_directory(std::path::Path::new(path))?,
            None => Assumptions::synthetic_default(),
        });
        self.worker_count = parsed.worker_count.max(1);
        Ok(())
    }

    fn run_chunk(&mut self, bus: &Bus, inputs: &[String], outputs: &[String]) -> ChunkOutcome {
        let start = Instant::now();
        let policies = match &self.policies {
            Some(p) => p,
            None => return ChunkOutcome::failed("projection_aggregator: not initialized", 0),
        };
        let assumptions = match &self.assumptions {
            Some(a) => a,
            None => return ChunkOutcome::failed("projection_aggregator: not initialized", 0),
        };
        let input_name = match inputs.iter().find(|name| !crate::pipeline::is_sentinel(name)) {
            Some(n) => n,
            None => return ChunkOutcome::failed("projection_aggregator requires a scenario-matrix input", 0),
        };
        let output_name = match outputs.first() {
            Some(n) => n,
            None => return ChunkOutcome::failed("projection_aggregator requires one declared output", 0),
        };

        let shape = match bus.handle_for(input_name) {
            Some(h) => h.shape,
            None => return ChunkOutcome::failed(format!("no such bus segment: {input_name}"), 0),
        };
        if shape.len() != 2 {
            return ChunkOutcome::failed(format!("scenario segment '{input_name}' has unexpected shape {shape:?}"), 0);
        }
        let (rows, cols) = (shape[0], shape[1]);

        let read_result = bus.acquire_read::<f64, _>(input_name, |slice| slice.to_vec());
        let rates = match read_result {
            Ok(v) => v,
            Err(e) => return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };
        let scenarios = ScenarioMatrix { rows, cols, rates };

        let config = AggregatorConfig {
            worker_count: self.worker_count,
            kernel_config: crate::kernel::KernelConfig::default(),
            store_distribution: false,
        };
        let cancel = AtomicBool::new(false);
        let (result, warnings) = match aggregator::run(policies, assumptions, &scenarios, &config, None, &cancel) {
            Ok(r) => r,
            Err(e) => return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };

        let consumers = self.consumers.get(output_name).copied().unwrap_or(1);
        let handle = match bus.allocate(output_name, &[result.scenario_npvs.len()], std::mem::size_of::<f64>(), consumers) {
            Ok(h) => h,
            Err(e) => return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };
        let write_result = bus.write_region::<f64, _>(&handle, |slice| slice.copy_from_slice(&result.scenario_npvs));
        if let Err(e) = write_result {
            return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64);
        }
        if let Err(e) = bus.publish(&handle) {
            return ChunkOutcome::failed(e.to_string(), start.elapsed().as_millis() as u64);
        }

        info!(
            "projection_aggregator: {} scenarios, mean_npv={:.2}, cte_95={:.2}, {} udf warnings",
            result.scenario_count, result.statistics.mean_npv, result.statistics.cte_95, warnings.udf_warning_count
        );

        let mut chunk_warnings: Vec<String> = warnings.numeric.iter().map(|w| w.message.clone()).collect();
        if warnings.udf_warning_count > 0 {
            chunk_warnings.push(format!("{} UDF warnings", warnings.udf_warning_count));
        }

        let mut outcome = ChunkOutcome::ok(
            result.scenario_count as u64,
            (result.scenario_npvs.len() * std::mem::size_of::<f64>()) as u64,
            start.elapsed().as_millis() as u64,
        );
        outcome.warnings = chunk_warnings;
        outcome
    }

    fn dispose(&mut self) {}
}

/// A small synthetic portfolio, used when a `projection_aggregator` node's
/// config omits `policies_path` -- convenient for demos and the pipeline
/// integration tests, never a substitute for a real portfolio load.
fn synthetic_demo_policies() -> PolicySet {
    use crate::policy::{Gender, Policy, ProductType};
    PolicySet::new(vec![
        Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap(),
        Policy::new(2, 45, Gender::Female, 250_000.0, 1_200.0, 15, ProductType::WholeLife).unwrap(),
        Policy::new(3, 50, Gender::Male, 150_000.0, 900.0, 10, ProductType::Endowment).unwrap(),
    ])
}
