//! Pipeline configuration document, per SPEC_FULL.md §6.

use super::node::NodeSpec;
use serde::Deserialize;

/// `debug {enableIntegrityChecks, breakpoints, zeroMemoryBetweenRuns}` (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugConfig {
    #[serde(default)]
    pub enable_integrity_checks: bool,
    #[serde(default)]
    pub breakpoints: Vec<String>,
    #[serde(default)]
    pub zero_memory_between_runs: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_integrity_checks: false,
            breakpoints: Vec::new(),
            zero_memory_between_runs: false,
        }
    }
}

/// `errorHandling {continueOnError, maxErrors, timeoutMs}` (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    /// Default per-node timeout when a node doesn't declare its own.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_max_errors() -> u32 {
    0
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_errors: default_max_errors(),
            timeout_ms: None,
        }
    }
}

/// The full pipeline configuration document: `{ nodes, debug?,
/// errorHandling? }` (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default, rename = "errorHandling")]
    pub error_handling: ErrorHandlingConfig,
}
