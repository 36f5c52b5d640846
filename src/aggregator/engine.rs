//! Parallel execution across worker partitions and reduction into a
//! `ValuationResult`, per SPEC_FULL.md §4.D.

use super::partition::partition_scenarios;
use super::result::{Statistics, ValuationResult};
use super::stats::compute_statistics;
use crate::assumptions::Assumptions;
use crate::error::EngineError;
use crate::kernel::{project_policy_scenario, KernelConfig};
use crate::policy::PolicySet;
use crate::scenario::ScenarioMatrix;
use crate::udf::UdfHost;
use log::warn;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A per-scenario arithmetic anomaly recorded during aggregation (§7
/// `NumericWarning`).
#[derive(Debug, Clone)]
pub struct NumericWarningRecord {
    pub scenario_id: u32,
    pub message: String,
}

/// Configuration for one aggregator run.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Worker count `W`; pinned via a dedicated rayon thread pool so the
    /// determinism properties in §8 are stated against an explicit,
    /// caller-controlled value rather than rayon's global default pool.
    pub worker_count: usize,
    pub kernel_config: KernelConfig,
    /// When set, the full per-scenario NPV vector is duplicated into
    /// `ValuationResult::distribution` (§6).
    pub store_distribution: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            kernel_config: KernelConfig::default(),
            store_distribution: false,
        }
    }
}

/// Everything a completed (possibly cancelled) aggregator run produced,
/// beyond the `ValuationResult` itself.
#[derive(Debug, Clone, Default)]
pub struct AggregationWarnings {
    pub numeric: Vec<NumericWarningRecord>,
    pub udf_warning_count: u32,
}

struct ChunkOutcome {
    npvs: Vec<f64>,
    numeric: Vec<NumericWarningRecord>,
    udf_warning_count: u32,
    cancelled: bool,
}

/// Run the valuation aggregator over `policies` for every scenario in
/// `scenarios`, partitioning scenarios across `config.worker_count`
/// workers.
pub fn run(
    policies: &PolicySet,
    assumptions: &Assumptions,
    scenarios: &ScenarioMatrix,
    config: &AggregatorConfig,
    udf: Option<&(dyn UdfHost + Sync)>,
    cancel: &AtomicBool,
) -> Result<(ValuationResult, AggregationWarnings), EngineError> {
    config.kernel_config.validate()?;

    let start = Instant::now();
    let chunks = partition_scenarios(scenarios.rows, config.worker_count);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count.max(1))
        .build()
        .map_err(|e| EngineError::Initialization {
            node_id: "aggregator".to_string(),
            message: format!("failed to build worker pool: {e}"),
        })?;

    let chunk_outcomes: Vec<ChunkOutcome> = pool.install(|| {
        chunks
            .par_iter()
            .map(|range| run_chunk(policies, assumptions, scenarios, config, udf, cancel, range.clone()))
            .collect()
    });

    let mut scenario_npvs = Vec::with_capacity(scenarios.rows);
    let mut warnings = AggregationWarnings::default();
    let mut cancelled = false;

    for outcome in chunk_outcomes {
        scenario_npvs.extend(outcome.npvs);
        warnings.numeric.extend(outcome.numeric);
        warnings.udf_warning_count += outcome.udf_warning_count;
        cancelled |= outcome.cancelled;
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;

    let statistics = if cancelled {
        Statistics::default()
    } else {
        compute_statistics(&scenario_npvs)
    };

    let distribution = if config.store_distribution && !cancelled {
        Some(scenario_npvs.clone())
    } else {
        None
    };

    let result = ValuationResult {
        scenario_count: scenario_npvs.len() as u32,
        scenario_npvs,
        statistics,
        execution_time_ms,
        distribution,
        cancelled,
    };

    Ok((result, warnings))
}

fn run_chunk(
    policies: &PolicySet,
    assumptions: &Assumptions,
    scenarios: &ScenarioMatrix,
    config: &AggregatorConfig,
    udf: Option<&(dyn UdfHost + Sync)>,
    cancel: &AtomicBool,
    range: std::ops::Range<usize>,
) -> ChunkOutcome {
    let chunk_len = range.len();
    let mut npvs = Vec::with_capacity(chunk_len);
    let mut numeric = Vec::new();
    let mut udf_warning_count = 0u32;
    let mut cancelled = false;

    for scenario_id in range {
        if cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }

        let rates = scenarios.row(scenario_id);
        let mut portfolio_npv = 0.0_f64;
        for policy in policies.iter() {
            let outcome = project_policy_scenario(
                policy,
                rates,
                assumptions,
                &config.kernel_config,
                udf,
            );
            portfolio_npv += outcome.npv;
            udf_warning_count += outcome.udf_warnings;
        }

        if !portfolio_npv.is_finite() {
            let message = format!("scenario {scenario_id} produced a non-finite NPV ({portfolio_npv})");
            warn!("{message}");
            numeric.push(NumericWarningRecord {
                scenario_id: scenario_id as u32,
                message,
            });
            portfolio_npv = f64::NAN;
        }

        npvs.push(portfolio_npv);
    }

    if cancelled {
        // Pad the scenarios this chunk never got to with NaN placeholders
        // so the concatenated `scenario_npvs` vector still has one entry
        // per scenario.
        npvs.resize(chunk_len, f64::NAN);
    }

    ChunkOutcome {
        npvs,
        numeric,
        udf_warning_count,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{ExpenseAssumptions, LapseTable, MortalityTable};
    use crate::policy::{Gender, Policy, ProductType};
    use crate::scenario::ScenarioMatrix;

    fn flat_scenarios(rows: usize, cols: usize, rate: f64) -> ScenarioMatrix {
        ScenarioMatrix {
            rows,
            cols,
            rates: vec![rate; rows * cols],
        }
    }

    fn zero_decrement_assumptions() -> Assumptions {
        Assumptions::new(
            MortalityTable::new({
                let mut rates = vec![(0.0, 0.0); crate::assumptions::MAX_AGE + 1];
                rates[crate::assumptions::MAX_AGE] = (1.0, 1.0);
                rates
            }),
            LapseTable::flat(0.0),
            ExpenseAssumptions::new(0.0, 0.0, 0.0, 0.0),
        )
    }

    #[test]
    fn test_worker_count_invariant_npvs_bit_identical() {
        let policies = PolicySet::new(vec![
            Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap(),
            Policy::new(2, 45, Gender::Female, 250_000.0, 1200.0, 15, ProductType::WholeLife).unwrap(),
        ]);
        let assumptions = zero_decrement_assumptions();
        let scenarios = flat_scenarios(20, 20, 0.05);
        let cancel = AtomicBool::new(false);

        let config_w1 = AggregatorConfig {
            worker_count: 1,
            ..Default::default()
        };
        let config_w4 = AggregatorConfig {
            worker_count: 4,
            ..Default::default()
        };

        let (result_w1, _) = run(&policies, &assumptions, &scenarios, &config_w1, None, &cancel).unwrap();
        let (result_w4, _) = run(&policies, &assumptions, &scenarios, &config_w4, None, &cancel).unwrap();

        assert_eq!(result_w1.scenario_npvs, result_w4.scenario_npvs);
        assert!((result_w1.statistics.mean_npv - result_w4.statistics.mean_npv).abs() < 1e-9);
    }

    #[test]
    fn test_cancellation_skips_post_processing() {
        let policies = PolicySet::new(vec![
            Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap(),
        ]);
        let assumptions = zero_decrement_assumptions();
        let scenarios = flat_scenarios(10, 10, 0.05);
        let cancel = AtomicBool::new(true);
        let config = AggregatorConfig {
            worker_count: 2,
            ..Default::default()
        };

        let (result, _) = run(&policies, &assumptions, &scenarios, &config, None, &cancel).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.statistics.mean_npv, 0.0);
    }

    #[test]
    fn test_nan_scenario_is_recorded_as_warning() {
        let policies = PolicySet::new(vec![
            Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 5, ProductType::Term).unwrap(),
        ]);
        let assumptions = zero_decrement_assumptions();
        // rate of -1.0 makes 1/(1+r) divide by zero -> inf/NaN propagation.
        let scenarios = flat_scenarios(1, 5, -1.0);
        let cancel = AtomicBool::new(false);
        let config = AggregatorConfig::default();

        let (result, warnings) = run(&policies, &assumptions, &scenarios, &config, None, &cancel).unwrap();
        assert!(result.scenario_npvs[0].is_nan());
        assert_eq!(warnings.numeric.len(), 1);
    }
}
