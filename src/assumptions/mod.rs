//! Actuarial assumption tables: mortality, lapse, and expenses, per
//! SPEC_FULL.md §4.A.

mod mortality;
mod lapse;
mod expense;
pub mod loader;

pub use mortality::{MortalityTable, MAX_AGE};
pub use lapse::{LapseTable, MAX_YEAR};
pub use expense::ExpenseAssumptions;
pub use loader::LoadedAssumptions;

use std::path::Path;

/// Scalar multipliers applied to each table, per §4.A ("Supports a scalar
/// multiplier"). Defaults to 1.0 (no adjustment) for every table.
#[derive(Debug, Clone, Copy)]
pub struct AssumptionMultipliers {
    pub mortality: f64,
    pub lapse: f64,
    pub expense: f64,
}

impl Default for AssumptionMultipliers {
    fn default() -> Self {
        Self {
            mortality: 1.0,
            lapse: 1.0,
            expense: 1.0,
        }
    }
}

/// The full set of assumption tables a kernel run needs, bundled with their
/// multipliers.
#[derive(Debug, Clone)]
pub struct Assumptions {
    pub mortality: MortalityTable,
    pub lapse: LapseTable,
    pub expenses: ExpenseAssumptions,
    pub multipliers: AssumptionMultipliers,
}

impl Assumptions {
    pub fn new(mortality: MortalityTable, lapse: LapseTable, expenses: ExpenseAssumptions) -> Self {
        Self {
            mortality,
            lapse,
            expenses,
            multipliers: AssumptionMultipliers::default(),
        }
    }

    pub fn with_multipliers(mut self, multipliers: AssumptionMultipliers) -> Self {
        self.multipliers = multipliers;
        self
    }

    /// Synthetic defaults, useful for tests and demos absent a calibrated
    /// assumption set.
    pub fn synthetic_default() -> Self {
        Self::new(
            MortalityTable::synthetic_default(),
            LapseTable::flat(0.05),
            ExpenseAssumptions::new(100.0, 20.0, 0.01, 250.0),
        )
    }

    /// Load all three tables from a directory containing `mortality.csv`,
    /// `lapse.csv`, and `expenses.json`, per §6.
    pub fn from_directory(path: &Path) -> Result<Self, crate::error::EngineError> {
        let loaded = LoadedAssumptions::load_from(path)?;
        Ok(Self::new(
            MortalityTable::from_loaded(&loaded),
            LapseTable::from_loaded(&loaded),
            ExpenseAssumptions::from_loaded(&loaded),
        ))
    }

    pub fn qx(&self, age: u8, gender: crate::policy::Gender) -> f64 {
        self.mortality.qx(age, gender, self.multipliers.mortality)
    }

    pub fn lapse_rate(&self, year: u32) -> f64 {
        self.lapse.rate(year, self.multipliers.lapse)
    }

    pub fn first_year_expense(&self, premium: f64) -> f64 {
        self.expenses.first_year(premium, self.multipliers.expense)
    }

    pub fn renewal_expense(&self, premium: f64) -> f64 {
        self.expenses.renewal(premium, self.multipliers.expense)
    }
}
