//! Deterministic mean-reverting interest-rate scenario generation, per
//! SPEC_FULL.md §4.B.

mod archetypes;
mod generator;
mod seed;

pub use archetypes::{archetype_for, skeleton_rate, Archetype};
pub use generator::{
    RateModel, ScenarioConfig, ScenarioGenerator, ScenarioMatrix, YieldCurveParams, MIN_RATE,
};
pub use seed::path_seed;

use serde::{Deserialize, Serialize};

/// Identity of a `ScenarioSet`: two sets with equal identity must produce
/// bit-identical rate matrices on the same build (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSetIdentity {
    pub model: RateModel,
    pub outer_paths: u32,
    pub inner_paths_per_outer: u32,
    pub seed: u64,
    pub projection_years: u32,
    pub yield_curve_version: String,
}

impl From<&ScenarioConfig> for ScenarioSetIdentity {
    fn from(config: &ScenarioConfig) -> Self {
        Self {
            model: config.model,
            outer_paths: config.outer_paths,
            inner_paths_per_outer: config.inner_paths_per_outer,
            seed: config.seed,
            projection_years: config.projection_years,
            yield_curve_version: config.yield_curve.version.clone(),
        }
    }
}
