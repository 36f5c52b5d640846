//! Node specification and per-node lifecycle state, per SPEC_FULL.md §4.F.

use super::engine_trait::EngineConfig;
use serde::Deserialize;

/// Names reserved as pipeline inputs that are not produced by any node:
/// the policy set, assumption tables, and scenario matrix handed in from
/// the surrounding CLI/caller (§4.F "a sentinel").
pub const SENTINELS: [&str; 3] = ["$policies", "$assumptions", "$scenarios"];

pub fn is_sentinel(name: &str) -> bool {
    SENTINELS.contains(&name)
}

/// One node's static declaration, as read from pipeline configuration JSON
/// (§6 "a JSON document with `nodes: [{id, engine, inputs, outputs,
/// config}]`").
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub engine: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Per-node lifecycle state (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Ready,
    Running,
    /// Entered after each successful `run_chunk`; functionally identical to
    /// `Ready` but kept distinct so the executor can tell "never run" from
    /// "ran at least once" when deciding whether a re-run needs
    /// `initialize` again.
    ReadyAgain,
    Error,
    Disposed,
}

impl NodeState {
    pub fn is_runnable(&self) -> bool {
        matches!(self, NodeState::Ready | NodeState::ReadyAgain)
    }
}

/// Outcome of executing one node, attached to the pipeline's run summary
/// (§7 "errors from a node are attached to its execution record with
/// `node_id`, kind, message, and the bus names that were in-flight").
#[derive(Debug, Clone)]
pub struct NodeExecutionRecord {
    pub node_id: String,
    pub final_state: NodeState,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub in_flight_segments: Vec<String>,
    pub warnings: Vec<String>,
    pub rows_processed: u64,
    pub execution_time_ms: u64,
    pub skipped: bool,
}

impl NodeExecutionRecord {
    pub fn is_fatal(&self) -> bool {
        self.error_kind.is_some() && !self.skipped
    }
}
