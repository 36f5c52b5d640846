//! Pipeline execution: runs a validated graph in topological order,
//! driving each node through its `initialize -> run_chunk -> dispose`
//! lifecycle and applying the configured error policy, per SPEC_FULL.md
//! §4.F.
//!
//! Node-level timeout enforcement is detect-and-report rather than
//! preemptive: Rust has no safe way to kill a running thread, and the UDF
//! host already owns the one place truly external, bounded-time work
//! happens (§4.G's `invoke_bounded`). A node that wraps external work is
//! expected to bound it the same way; the executor's job is just to
//! compare the node's own reported `execution_time_ms` against its
//! configured ceiling.

use super::config::{ErrorHandlingConfig, PipelineConfig};
use super::engine_registry::EngineRegistry;
use super::engine_trait::{Credentials, EngineConfig};
use super::graph::build_graph;
use super::node::{is_sentinel, NodeExecutionRecord, NodeSpec, NodeState};
use crate::bus::Bus;
use crate::error::EngineError;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Overall run outcome, per §7: "ok only if every node completed without
/// fatal errors".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineRunSummary {
    pub status: RunStatus,
    pub node_records: Vec<NodeExecutionRecord>,
    pub skipped_count: u32,
    /// Raw bytes of every successfully produced output with no in-pipeline
    /// consumer, read back and released on the caller's behalf so the bus's
    /// reference count still returns to zero (§8) without losing the data.
    /// Keyed by bus name.
    pub terminal_outputs: HashMap<String, Vec<u8>>,
}

/// Drives a pipeline over a shared bus, consulting an [`EngineRegistry`]
/// to construct one engine instance per node.
pub struct PipelineRunner<'a> {
    registry: &'a EngineRegistry,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(registry: &'a EngineRegistry) -> Self {
        Self { registry }
    }

    pub fn run(
        &self,
        config: &PipelineConfig,
        bus: &Bus,
        credentials: Option<&Credentials>,
    ) -> Result<PipelineRunSummary, EngineError> {
        let known = self.registry.known_names();
        let graph = build_graph(&config.nodes, &known)?;
        let nodes_by_id: HashMap<&str, &NodeSpec> =
            config.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let consumer_counts = consumer_counts(&config.nodes);

        let mut invalid_outputs: HashSet<String> = HashSet::new();
        let mut produced_handles: HashMap<String, crate::bus::SegmentHandle> = HashMap::new();
        let mut records = Vec::with_capacity(graph.order.len());
        let mut error_count = 0u32;
        let mut halted = false;
        let mut skipped_count = 0u32;

        for node_id in &graph.order {
            let node = nodes_by_id[node_id.as_str()];

            if halted {
                records.push(skipped_record(node));
                skipped_count += 1;
                continue;
            }

            let blocked_on = node
                .inputs
                .iter()
                .find(|input| !is_sentinel(input) && invalid_outputs.contains(*input));
            if let Some(blocked) = blocked_on {
                info!("skipping node '{node_id}': upstream segment '{blocked}' is invalid");
                for output in &node.outputs {
                    invalid_outputs.insert(output.clone());
                }
                records.push(skipped_record(node));
                skipped_count += 1;
                continue;
            }

            let record = self.run_node(node, bus, credentials, &consumer_counts, &config.error_handling);

            if let Some(handle) = record.node_output_handle.clone() {
                for output in &node.outputs {
                    produced_handles.insert(output.clone(), handle.clone());
                }
            }

            for input in &node.inputs {
                if is_sentinel(input) {
                    continue;
                }
                if let Some(handle) = produced_handles.get(input) {
                    if let Err(e) = bus.release(handle) {
                        warn!("failed to release bus segment '{input}' after node '{node_id}': {e}");
                    }
                }
            }

            if record.execution.is_fatal() {
                error!("node '{node_id}' failed: {:?}", record.execution.error_message);
                for output in &node.outputs {
                    invalid_outputs.insert(output.clone());
                }
                if !config.error_handling.continue_on_error {
                    halted = true;
                } else {
                    error_count += 1;
                    if error_count > config.error_handling.max_errors {
                        halted = true;
                    }
                }
            }

            records.push(record.execution);
        }

        let status = if records.iter().any(|r| r.is_fatal()) {
            RunStatus::Failed
        } else {
            RunStatus::Ok
        };

        let terminal_outputs = self.release_terminal_outputs(&config.nodes, bus, &produced_handles, &invalid_outputs);

        Ok(PipelineRunSummary { status, node_records: records, skipped_count, terminal_outputs })
    }

    /// A produced output with no in-pipeline consumer sits at `pending = 1`
    /// forever -- nothing in the node loop above ever releases it, since
    /// that loop only releases a node's *inputs*. Read each one back (so the
    /// data isn't lost) and release it here, on the implicit "pipeline
    /// caller" consumer's behalf, so the bus's refcount still reaches zero
    /// per §8 by the time `run` returns.
    fn release_terminal_outputs(
        &self,
        nodes: &[NodeSpec],
        bus: &Bus,
        produced_handles: &HashMap<String, crate::bus::SegmentHandle>,
        invalid_outputs: &HashSet<String>,
    ) -> HashMap<String, Vec<u8>> {
        let mut data = HashMap::new();
        for name in terminal_output_names(nodes) {
            let Some(handle) = produced_handles.get(&name) else {
                continue;
            };
            if !bus.is_allocated(&name) {
                continue;
            }
            if !invalid_outputs.contains(&name) {
                match bus.acquire_read_bytes(&name) {
                    Ok(bytes) => {
                        data.insert(name.clone(), bytes);
                    }
                    Err(e) => warn!("failed to read back terminal segment '{name}': {e}"),
                }
            }
            if let Err(e) = bus.release(handle) {
                warn!("failed to release terminal bus segment '{name}': {e}");
            }
        }
        data
    }

    fn run_node(
        &self,
        node: &NodeSpec,
        bus: &Bus,
        credentials: Option<&Credentials>,
        consumer_counts: &HashMap<String, u32>,
        error_handling: &ErrorHandlingConfig,
    ) -> NodeRunOutcome {
        let timeout_ms = node.timeout_ms.or(error_handling.timeout_ms);
        let mut engine = match self.registry.construct(&node.engine) {
            Some(e) => e,
            None => {
                return NodeRunOutcome {
                    execution: fatal_record(node, "ConfigurationError", "engine could not be constructed"),
                    node_output_handle: None,
                }
            }
        };

        let effective_config = inject_consumer_counts(&node.config, &node.outputs, consumer_counts);

        let init_result = engine.initialize(&effective_config, credentials);
        if let Err(e) = init_result {
            engine.dispose();
            return NodeRunOutcome {
                execution: fatal_record(node, "InitializationError", &e.to_string()),
                node_output_handle: None,
            };
        }

        let start = Instant::now();
        let outcome = engine.run_chunk(bus, &node.inputs, &node.outputs);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        engine.dispose();

        let timed_out = timeout_ms.map(|limit| elapsed_ms > limit).unwrap_or(false);

        let output_handle = node.outputs.first().and_then(|name| bus.handle_for(name));

        if timed_out {
            return NodeRunOutcome {
                execution: fatal_record(
                    node,
                    "TimeoutError",
                    &format!("node exceeded {}ms (took {elapsed_ms}ms)", timeout_ms.unwrap()),
                ),
                node_output_handle: output_handle,
            };
        }

        if !outcome.success {
            return NodeRunOutcome {
                execution: fatal_record(
                    node,
                    "ExecutionError",
                    outcome.error_message.as_deref().unwrap_or("run_chunk reported failure"),
                ),
                node_output_handle: output_handle,
            };
        }

        NodeRunOutcome {
            execution: NodeExecutionRecord {
                node_id: node.id.clone(),
                final_state: NodeState::ReadyAgain,
                error_kind: None,
                error_message: None,
                in_flight_segments: node.outputs.clone(),
                warnings: outcome.warnings,
                rows_processed: outcome.rows_processed,
                execution_time_ms: elapsed_ms,
                skipped: false,
            },
            node_output_handle: output_handle,
        }
    }
}

struct NodeRunOutcome {
    execution: NodeExecutionRecord,
    node_output_handle: Option<crate::bus::SegmentHandle>,
}

fn fatal_record(node: &NodeSpec, kind: &str, message: &str) -> NodeExecutionRecord {
    NodeExecutionRecord {
        node_id: node.id.clone(),
        final_state: NodeState::Error,
        error_kind: Some(kind.to_string()),
        error_message: Some(message.to_string()),
        in_flight_segments: node.inputs.iter().chain(node.outputs.iter()).cloned().collect(),
        warnings: Vec::new(),
        rows_processed: 0,
        execution_time_ms: 0,
        skipped: false,
    }
}

fn skipped_record(node: &NodeSpec) -> NodeExecutionRecord {
    NodeExecutionRecord {
        node_id: node.id.clone(),
        final_state: NodeState::Disposed,
        error_kind: None,
        error_message: None,
        in_flight_segments: Vec::new(),
        warnings: Vec::new(),
        rows_processed: 0,
        execution_time_ms: 0,
        skipped: true,
    }
}

/// How many consumers each produced bus name has, so engines can supply
/// `Bus::allocate`'s `declared_consumers` argument. A name with no
/// in-pipeline consumer still gets one: the pipeline caller itself, who
/// reads the terminal output after the run completes.
fn consumer_counts(nodes: &[NodeSpec]) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for node in nodes {
        for output in &node.outputs {
            counts.entry(output.clone()).or_insert(0);
        }
    }
    for node in nodes {
        for input in &node.inputs {
            if !is_sentinel(input) {
                *counts.entry(input.clone()).or_insert(0) += 1;
            }
        }
    }
    for count in counts.values_mut() {
        if *count == 0 {
            *count = 1;
        }
    }
    counts
}

/// Outputs that no node in the pipeline consumes as an input -- terminal
/// results meant for the caller, not for another node. These are the
/// segments `consumer_counts` floors to 1 (the implicit caller consumer),
/// and the only ones the executor itself must release after the run.
fn terminal_output_names(nodes: &[NodeSpec]) -> HashSet<String> {
    let consumed: HashSet<&str> = nodes
        .iter()
        .flat_map(|n| n.inputs.iter())
        .filter(|input| !is_sentinel(input))
        .map(|s| s.as_str())
        .collect();
    nodes
        .iter()
        .flat_map(|n| n.outputs.iter())
        .filter(|output| !consumed.contains(output.as_str()))
        .cloned()
        .collect()
}

/// Stamp a reserved `__bus_consumers__` key into a copy of the node's
/// config so engines can look up how many consumers each of their
/// declared outputs has without the executor needing to see inside
/// `Engine::run_chunk`.
fn inject_consumer_counts(
    config: &EngineConfig,
    outputs: &[String],
    consumer_counts: &HashMap<String, u32>,
) -> EngineConfig {
    let mut merged = config.clone();
    let mut map = serde_json::Map::new();
    for output in outputs {
        if let Some(count) = consumer_counts.get(output) {
            map.insert(output.clone(), serde_json::json!(count));
        }
    }
    merged.insert("__bus_consumers__".to_string(), serde_json::Value::Object(map));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine_trait::{ChunkOutcome, Engine, EngineInfo};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct RecordingEngine {
        name: &'static str,
        calls: Arc<AtomicU32>,
        fail: bool,
        sleep_ms: u64,
    }

    impl Engine for RecordingEngine {
        fn info(&self) -> EngineInfo {
            EngineInfo {
                name: self.name.to_string(),
                version: "1.0".to_string(),
                engine_type: "test".to_string(),
                supports_am: false,
                max_buffer_size: 0,
            }
        }

        fn initialize(&mut self, _config: &EngineConfig, _credentials: Option<&Credentials>) -> Result<(), EngineError> {
            Ok(())
        }

        fn run_chunk(&mut self, bus: &Bus, _inputs: &[String], outputs: &[String]) -> ChunkOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.sleep_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(self.sleep_ms));
            }
            if self.fail {
                return ChunkOutcome::failed("synthetic failure", 0);
            }
            for output in outputs {
                let handle = bus.allocate(output, &[4], 8, 1).unwrap();
                bus.write_region::<f64, _>(&handle, |_| ()).unwrap();
                bus.publish(&handle).unwrap();
            }
            ChunkOutcome::ok(4, 32, 0)
        }

        fn dispose(&mut self) {}
    }

    fn make_node(id: &str, engine: &str, inputs: &[&str], outputs: &[&str]) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            engine: engine.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            config: Default::default(),
            timeout_ms: None,
        }
    }

    #[test]
    fn test_linear_pipeline_runs_ok() {
        let mut registry = EngineRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        registry.register("gen", move || {
            Box::new(RecordingEngine { name: "gen", calls: calls_clone.clone(), fail: false, sleep_ms: 0 })
        });

        let config = PipelineConfig {
            nodes: vec![
                make_node("a", "gen", &["$scenarios"], &["bus://x/a"]),
                make_node("b", "gen", &["bus://x/a"], &["bus://x/b"]),
            ],
            debug: Default::default(),
            error_handling: Default::default(),
        };

        let bus = Bus::new(false);
        let runner = PipelineRunner::new(&registry);
        let summary = runner.run(&config, &bus, None).unwrap();

        assert_eq!(summary.status, RunStatus::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.skipped_count, 0);
    }

    #[test]
    fn test_halt_policy_skips_downstream() {
        let mut registry = EngineRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        registry.register("fail", move || {
            Box::new(RecordingEngine { name: "fail", calls: calls_clone.clone(), fail: true, sleep_ms: 0 })
        });

        let config = PipelineConfig {
            nodes: vec![
                make_node("a", "fail", &["$scenarios"], &["bus://x/a"]),
                make_node("b", "fail", &["bus://x/a"], &["bus://x/b"]),
            ],
            debug: Default::default(),
            error_handling: Default::default(),
        };

        let bus = Bus::new(false);
        let runner = PipelineRunner::new(&registry);
        let summary = runner.run(&config, &bus, None).unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continue_policy_tolerates_up_to_max_errors() {
        let mut registry = EngineRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        registry.register("fail", move || {
            Box::new(RecordingEngine { name: "fail", calls: calls_clone.clone(), fail: true, sleep_ms: 0 })
        });
        let ok_calls = Arc::new(AtomicU32::new(0));
        let ok_clone = ok_calls.clone();
        registry.register("ok", move || {
            Box::new(RecordingEngine { name: "ok", calls: ok_clone.clone(), fail: false, sleep_ms: 0 })
        });

        let config = PipelineConfig {
            nodes: vec![
                make_node("a", "fail", &["$scenarios"], &["bus://x/a"]),
                make_node("b", "ok", &["$policies"], &["bus://x/b"]),
            ],
            debug: Default::default(),
            error_handling: ErrorHandlingConfig {
                continue_on_error: true,
                max_errors: 1,
                timeout_ms: None,
            },
        };

        let bus = Bus::new(false);
        let runner = PipelineRunner::new(&registry);
        let summary = runner.run(&config, &bus, None).unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.skipped_count, 0);
    }

    #[test]
    fn test_node_timeout_is_reported() {
        let mut registry = EngineRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        registry.register("slow", move || {
            Box::new(RecordingEngine { name: "slow", calls: calls_clone.clone(), fail: false, sleep_ms: 50 })
        });

        let mut node = make_node("a", "slow", &["$scenarios"], &["bus://x/a"]);
        node.timeout_ms = Some(5);
        let config = PipelineConfig {
            nodes: vec![node],
            debug: Default::default(),
            error_handling: Default::default(),
        };

        let bus = Bus::new(false);
        let runner = PipelineRunner::new(&registry);
        let summary = runner.run(&config, &bus, None).unwrap();

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.node_records[0].error_kind.as_deref(), Some("TimeoutError"));
    }

    #[test]
    fn test_terminal_output_is_captured_and_bus_released() {
        let mut registry = EngineRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        registry.register("gen", move || {
            Box::new(RecordingEngine { name: "gen", calls: calls_clone.clone(), fail: false, sleep_ms: 0 })
        });

        let config = PipelineConfig {
            nodes: vec![
                make_node("a", "gen", &["$scenarios"], &["bus://x/a"]),
                make_node("b", "gen", &["bus://x/a"], &["bus://x/b"]),
            ],
            debug: Default::default(),
            error_handling: Default::default(),
        };

        let bus = Bus::new(false);
        let runner = PipelineRunner::new(&registry);
        let summary = runner.run(&config, &bus, None).unwrap();

        assert_eq!(summary.status, RunStatus::Ok);
        // "bus://x/a" is consumed in-pipeline by node "b" and is released as
        // part of the normal node loop.
        assert!(!bus.is_allocated("bus://x/a"));
        // "bus://x/b" has no in-pipeline consumer: the runner must still
        // release it after the run, but hand its data back in the summary.
        assert!(!bus.is_allocated("bus://x/b"));
        assert!(summary.terminal_outputs.contains_key("bus://x/b"));
        assert!(!summary.terminal_outputs.contains_key("bus://x/a"));
    }
}
