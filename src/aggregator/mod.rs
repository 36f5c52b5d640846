//! Parallel execution across worker partitions and scenario-NPV
//! aggregation, per SPEC_FULL.md §4.D.

mod engine;
mod partition;
mod result;
mod stats;

pub use engine::{run, AggregationWarnings, AggregatorConfig, NumericWarningRecord};
pub use partition::partition_scenarios;
pub use result::{Percentiles, Statistics, ValuationResult};
pub use stats::compute_statistics;
