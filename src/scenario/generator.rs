//! Vasicek / CIR scenario path generation, per SPEC_FULL.md §4.B.

use super::archetypes::{archetype_for, skeleton_rate};
use super::seed::path_seed;
use crate::error::EngineError;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Rate floor, per §4.B ("Rates are floored at 0.001").
pub const MIN_RATE: f64 = 0.001;

/// Which mean-reverting short-rate model generates inner paths around the
/// outer skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateModel {
    Vasicek,
    Cir,
}

/// Vasicek/CIR calibration: mean-reversion speed `a`, volatility `sigma`,
/// and the starting short rate `r0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YieldCurveParams {
    pub r0: f64,
    pub mean_reversion_speed: f64,
    pub volatility: f64,
    /// A version tag distinguishing calibrations with the same numeric
    /// parameters but different provenance; part of `ScenarioSet` identity.
    pub version: String,
}

/// The inputs that together determine `ScenarioSet` identity -- two configs
/// with equal fields must produce bit-identical matrices on the same build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub model: RateModel,
    pub outer_paths: u32,
    pub inner_paths_per_outer: u32,
    pub projection_years: u32,
    pub seed: u64,
    pub yield_curve: YieldCurveParams,
}

impl ScenarioConfig {
    /// Validate range constraints from §4.B's Inputs list.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(3..=10).contains(&self.outer_paths) {
            return Err(EngineError::Configuration {
                message: format!("outer_paths ({}) must be in [3, 10]", self.outer_paths),
                path: None,
            });
        }
        if !(100..=10_000).contains(&self.inner_paths_per_outer) {
            return Err(EngineError::Configuration {
                message: format!(
                    "inner_paths_per_outer ({}) must be in [100, 10000]",
                    self.inner_paths_per_outer
                ),
                path: None,
            });
        }
        if !(1..=100).contains(&self.projection_years) {
            return Err(EngineError::Configuration {
                message: format!("projection_years ({}) must be in [1, 100]", self.projection_years),
                path: None,
            });
        }
        Ok(())
    }

    /// Total scenario count `N = outer_paths * inner_paths_per_outer`.
    pub fn total_scenarios(&self) -> u32 {
        self.outer_paths * self.inner_paths_per_outer
    }
}

/// A generated `(N x projection_years)` row-major rate matrix.
#[derive(Debug, Clone)]
pub struct ScenarioMatrix {
    pub rows: usize,
    pub cols: usize,
    pub rates: Vec<f64>,
}

impl ScenarioMatrix {
    pub fn row(&self, scenario: usize) -> &[f64] {
        let start = scenario * self.cols;
        &self.rates[start..start + self.cols]
    }
}

/// Generates scenario matrices from a `ScenarioConfig`. Stateless: every
/// call derives its RNG streams fresh from the config's seed, so repeated
/// calls with the same config produce bit-identical output regardless of
/// call order or thread scheduling (§8).
pub struct ScenarioGenerator;

impl ScenarioGenerator {
    /// Generate a fresh, owned matrix.
    pub fn generate(config: &ScenarioConfig) -> Result<ScenarioMatrix, EngineError> {
        config.validate()?;
        let rows = config.total_scenarios() as usize;
        let cols = config.projection_years as usize;
        let mut rates = vec![0.0_f64; rows * cols];
        Self::generate_into(config, &mut rates)?;
        Ok(ScenarioMatrix { rows, cols, rates })
    }

    /// Generate directly into a caller-provided buffer (e.g. a bus
    /// write-region), per §4.B's "writes row-major into the provided
    /// aligned buffer". Fails with `ExecutionError` on a dimension
    /// mismatch.
    pub fn generate_into(config: &ScenarioConfig, buffer: &mut [f64]) -> Result<(), EngineError> {
        config.validate()?;
        let rows = config.total_scenarios() as usize;
        let cols = config.projection_years as usize;
        if buffer.len() != rows * cols {
            return Err(EngineError::Execution {
                node_id: "scenario_generator".to_string(),
                message: format!(
                    "buffer length {} does not match {} scenarios x {} years",
                    buffer.len(),
                    rows,
                    cols
                ),
            });
        }

        for outer in 0..config.outer_paths {
            let archetype = archetype_for(outer);
            for inner in 0..config.inner_paths_per_outer {
                let scenario_index = (outer * config.inner_paths_per_outer + inner) as usize;
                let row_start = scenario_index * cols;
                let row = &mut buffer[row_start..row_start + cols];
                Self::generate_path(config, archetype, outer, inner, row);
            }
        }
        Ok(())
    }

    fn generate_path(
        config: &ScenarioConfig,
        archetype: super::archetypes::Archetype,
        outer: u32,
        inner: u32,
        row: &mut [f64],
    ) {
        let seed = path_seed(config.seed, outer, inner);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let params = &config.yield_curve;

        let mut r = params.r0.max(MIN_RATE);
        for (t, slot) in row.iter_mut().enumerate() {
            let year = (t + 1) as u32;
            let b_t = skeleton_rate(archetype, year, params.r0);
            let z: f64 = StandardNormal.sample(&mut rng);

            let diffusion = match config.model {
                RateModel::Vasicek => params.volatility,
                RateModel::Cir => params.volatility * r.max(0.0).sqrt(),
            };

            r = r + params.mean_reversion_speed * (b_t - r) + diffusion * z;
            r = r.max(MIN_RATE);
            *slot = r;
        }
    }
}
