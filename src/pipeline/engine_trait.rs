//! The native engine ABI, per SPEC_FULL.md §4.F / §6.
//!
//! Modeled the same way `reserves::ReserveCalculator` is modeled: a small
//! set of required primitives plus a default method layered on top, so an
//! engine that genuinely has nothing to chunk can implement `run_chunk`
//! once and get a sensible default for repeated invocation.

use crate::bus::Bus;
use std::collections::HashMap;

/// Static identity an engine reports at registration time (§6 `info()`).
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    pub engine_type: String,
    pub supports_am: bool,
    pub max_buffer_size: usize,
}

/// Opaque engine configuration, carried verbatim from a node's JSON
/// `config` object. Engines downcast the values they expect; unrecognized
/// keys are ignored.
pub type EngineConfig = HashMap<String, serde_json::Value>;

/// Opaque credential bundle, passed into `initialize` and never logged
/// (§4.F).
#[derive(Clone)]
pub struct Credentials(pub HashMap<String, String>);

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials({{ <{} entries redacted> }})", self.0.len())
    }
}

/// Outcome of one `run_chunk` call (§6).
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub success: bool,
    pub execution_time_ms: u64,
    pub rows_processed: u64,
    pub bytes_written: u64,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

impl ChunkOutcome {
    pub fn ok(rows_processed: u64, bytes_written: u64, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            execution_time_ms,
            rows_processed,
            bytes_written,
            warnings: Vec::new(),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            execution_time_ms,
            rows_processed: 0,
            bytes_written: 0,
            warnings: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

/// A unit of pipeline work bound to a bus. Implementations must not throw
/// out of `dispose` (§4.F: "guaranteed even on failure, and must not
/// throw").
///
/// `run_chunk` is the required primitive; `run_chunk_batch` is a default
/// method layered over it for engines that chunk their own inputs -- most
/// engines call `run_chunk` exactly once and never override it, the same
/// way most `ReserveCalculator` implementations never override
/// `calculate_reserves_batch`.
pub trait Engine: Send {
    fn info(&self) -> EngineInfo;

    fn initialize(
        &mut self,
        config: &EngineConfig,
        credentials: Option<&Credentials>,
    ) -> Result<(), crate::error::EngineError>;

    fn run_chunk(
        &mut self,
        bus: &Bus,
        inputs: &[String],
        outputs: &[String],
    ) -> ChunkOutcome;

    /// Guaranteed to run once per node lifecycle, even after a failed
    /// `initialize` or `run_chunk`. Infallible by contract.
    fn dispose(&mut self);

    /// Run the same `(inputs, outputs)` across `n` repeated chunks. Most
    /// engines don't chunk their own input and should leave this at its
    /// default of one call.
    fn run_chunk_batch(
        &mut self,
        bus: &Bus,
        inputs: &[String],
        outputs: &[String],
        n: usize,
    ) -> Vec<ChunkOutcome> {
        (0..n.max(1)).map(|_| self.run_chunk(bus, inputs, outputs)).collect()
    }
}
