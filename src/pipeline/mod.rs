//! The pipeline runtime: DAG validation, topological order, per-node
//! lifecycle, and the native engine ABI, per SPEC_FULL.md §4.F.

mod builtin_engines;
mod config;
mod engine_registry;
mod engine_trait;
mod executor;
mod graph;
mod node;

pub use builtin_engines::{ProjectionAggregatorEngine, ScenarioGeneratorEngine};
pub use config::{DebugConfig, ErrorHandlingConfig, PipelineConfig};
pub use engine_registry::EngineRegistry;
pub use engine_trait::{ChunkOutcome, Credentials, Engine, EngineConfig, EngineInfo};
pub use executor::{PipelineRunSummary, PipelineRunner, RunStatus};
pub use graph::{build_graph, PipelineGraph};
pub use node::{is_sentinel, NodeExecutionRecord, NodeSpec, NodeState, SENTINELS};

/// An [`EngineRegistry`] pre-populated with the core's own engines
/// (`scenario_generator`, `projection_aggregator`), so a caller assembling
/// a pipeline from JSON config doesn't need to hand-register them.
pub fn default_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register("scenario_generator", || Box::new(ScenarioGeneratorEngine::new()));
    registry.register("projection_aggregator", || Box::new(ProjectionAggregatorEngine::new()));
    registry
}
