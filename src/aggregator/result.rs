//! `ValuationResult`: the scenario-NPV distribution and its summary
//! statistics, per SPEC_FULL.md §3.

use serde::{Deserialize, Serialize};

/// Percentiles of the scenario-NPV distribution, linear-interpolated at
/// fractional rank `i = p * (n - 1)` on the sorted vector (§4.D).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Summary statistics over a scenario-NPV distribution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub mean_npv: f64,
    pub std_dev: f64,
    pub percentiles: Percentiles,
    pub cte_95: f64,
}

/// The result of running the valuation aggregator over a portfolio and a
/// scenario set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    pub scenario_npvs: Vec<f64>,
    pub statistics: Statistics,
    pub execution_time_ms: u64,
    pub scenario_count: u32,
    /// Present (non-empty) only when the run opted into storing the full
    /// distribution (§6's `distribution` output key); otherwise `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Vec<f64>>,
    /// Set when the run was cooperatively cancelled before every chunk
    /// completed. A cancelled result carries whatever `scenario_npvs` were
    /// produced by completed chunks (`f64::NAN` for scenarios in
    /// not-yet-run chunks) and skips summary-statistics post-processing
    /// (§4.D: "no post-processing").
    pub cancelled: bool,
}

impl ValuationResult {
    pub fn per_scenario_columns(&self) -> Vec<(u32, f64)> {
        self.scenario_npvs
            .iter()
            .enumerate()
            .map(|(i, &npv)| (i as u32, npv))
            .collect()
    }
}
