//! Behavioral error kinds shared across the engine.
//!
//! Variant names describe *behavior*, not the module that raised them --
//! the same `EngineError` enum is used by assumption loaders, the pipeline
//! runtime, the typed bus, and the UDF host, so a caller downstream of any
//! of them can match on a single type.

use thiserror::Error;

/// Errors raised by the core engine. See SPEC_FULL.md §7 for the behavioral
/// contract of each kind.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Out-of-range or missing configuration; surfaced at `initialize`;
    /// fatal for that node.
    #[error("configuration error{}: {message}", path.as_ref().map(|p| format!(" ({p})")).unwrap_or_default())]
    Configuration {
        message: String,
        path: Option<String>,
    },

    /// A CSV/binary row failed to parse; carries the offending line number.
    #[error("malformed row at {path}:{line}: {source}")]
    MalformedRow {
        path: String,
        line: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unable to acquire an external resource (assumption table,
    /// credentials); fatal for that node; policy-dependent for the pipeline.
    #[error("initialization error in node {node_id}: {message}")]
    Initialization { node_id: String, message: String },

    /// Runtime failure in `run_chunk` (I/O, malformed input);
    /// policy-dependent.
    #[error("execution error in node {node_id}: {message}")]
    Execution { node_id: String, message: String },

    /// CRC mismatch on a bus segment; always fatal.
    #[error("integrity error on bus segment {segment}: {message}")]
    Integrity { segment: String, message: String },

    /// A node exceeded `timeout_ms`; treated as an `Execution` error by
    /// the active error policy.
    #[error("node {node_id} timed out after {timeout_ms}ms")]
    Timeout { node_id: String, timeout_ms: u64 },

    /// The DAG itself is invalid (duplicate ids, cycle, unresolved input).
    #[error("invalid pipeline: {message}")]
    InvalidPipeline { message: String },
}

/// Non-fatal conditions recorded on a node's or run's execution record.
/// These never become an `Err` -- they are status, not failure.
#[derive(Debug, Clone)]
pub enum EngineWarning {
    /// NaN/inf arithmetic result; the offending scenario NPV is set to NaN
    /// and the run continues.
    Numeric { scenario_id: u32, message: String },
    /// A UDF call failed, timed out, or returned an out-of-range
    /// multiplier; the multiplier defaulted to 1.0.
    Udf {
        policy_id: u64,
        year: u32,
        function: String,
        message: String,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
