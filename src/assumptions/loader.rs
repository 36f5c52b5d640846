//! CSV/JSON-based assumption loaders.
//!
//! Each loader rejects malformed rows with the offending line number, per
//! SPEC_FULL.md §4.A.

use super::expense::ExpenseAssumptions;
use super::mortality::MAX_AGE;
use crate::error::EngineError;
use csv::Reader;
use std::fs::File;
use std::path::Path;

fn malformed(path: &Path, line: u64, source: impl std::error::Error + Send + Sync + 'static) -> EngineError {
    EngineError::MalformedRow {
        path: path.display().to_string(),
        line,
        source: Box::new(source),
    }
}

/// Load `age,male_qx,female_qx` covering `0..=120`, per §6.
pub fn load_mortality_rates(path: &Path) -> Result<Vec<(f64, f64)>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::Configuration {
        message: format!("cannot open mortality table: {e}"),
        path: Some(path.display().to_string()),
    })?;
    let mut reader = Reader::from_reader(file);
    let mut rates = vec![(0.0, 0.0); MAX_AGE + 1];

    for result in reader.records() {
        let record = result.map_err(|e| malformed(path, 0, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let age: usize = record
            .get(0)
            .ok_or_else(|| malformed(path, line, ParseFieldError::missing("age")))?
            .parse()
            .map_err(|e: std::num::ParseIntError| malformed(path, line, e))?;
        let male: f64 = record
            .get(1)
            .ok_or_else(|| malformed(path, line, ParseFieldError::missing("male_qx")))?
            .parse()
            .map_err(|e: std::num::ParseFloatError| malformed(path, line, e))?;
        let female: f64 = record
            .get(2)
            .ok_or_else(|| malformed(path, line, ParseFieldError::missing("female_qx")))?
            .parse()
            .map_err(|e: std::num::ParseFloatError| malformed(path, line, e))?;

        if age <= MAX_AGE {
            rates[age] = (male, female);
        }
    }
    rates[MAX_AGE] = (1.0, 1.0);

    Ok(rates)
}

/// Load `year,lapse_rate` covering `1..=50`, per §6.
pub fn load_lapse_rates(path: &Path) -> Result<Vec<f64>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::Configuration {
        message: format!("cannot open lapse table: {e}"),
        path: Some(path.display().to_string()),
    })?;
    let mut reader = Reader::from_reader(file);
    let mut rates = vec![0.0; super::lapse::MAX_YEAR];

    for result in reader.records() {
        let record = result.map_err(|e| malformed(path, 0, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let year: usize = record
            .get(0)
            .ok_or_else(|| malformed(path, line, ParseFieldError::missing("year")))?
            .parse()
            .map_err(|e: std::num::ParseIntError| malformed(path, line, e))?;
        let rate: f64 = record
            .get(1)
            .ok_or_else(|| malformed(path, line, ParseFieldError::missing("lapse_rate")))?
            .parse()
            .map_err(|e: std::num::ParseFloatError| malformed(path, line, e))?;

        if year > 0 && year <= rates.len() {
            rates[year - 1] = rate;
        }
    }

    Ok(rates)
}

/// Load expense assumptions from JSON with keys `per_policy_acquisition`,
/// `per_policy_maintenance`, `percent_of_premium`, `claim_expense`, per §6.
pub fn load_expenses(path: &Path) -> Result<ExpenseAssumptions, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|e| EngineError::Configuration {
        message: format!("cannot open expense assumptions: {e}"),
        path: Some(path.display().to_string()),
    })?;
    let raw: RawExpenses = serde_json::from_str(&text).map_err(|e| EngineError::Configuration {
        message: format!("malformed expense assumptions JSON: {e}"),
        path: Some(path.display().to_string()),
    })?;
    Ok(ExpenseAssumptions::new(
        raw.per_policy_acquisition,
        raw.per_policy_maintenance,
        raw.percent_of_premium,
        raw.claim_expense,
    ))
}

#[derive(serde::Deserialize)]
struct RawExpenses {
    per_policy_acquisition: f64,
    per_policy_maintenance: f64,
    percent_of_premium: f64,
    claim_expense: f64,
}

#[derive(Debug)]
struct ParseFieldError(String);

impl ParseFieldError {
    fn missing(field: &str) -> Self {
        Self(format!("missing field '{field}'"))
    }
}

impl std::fmt::Display for ParseFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseFieldError {}

/// All assumption tables loaded from a directory containing
/// `mortality.csv`, `lapse.csv`, and `expenses.json`.
pub struct LoadedAssumptions {
    pub mortality_rates: Vec<(f64, f64)>,
    pub lapse_rates: Vec<f64>,
    pub expenses: ExpenseAssumptions,
}

impl LoadedAssumptions {
    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            mortality_rates: load_mortality_rates(&path.join("mortality.csv"))?,
            lapse_rates: load_lapse_rates(&path.join("lapse.csv"))?,
            expenses: load_expenses(&path.join("expenses.json"))?,
        })
    }
}
