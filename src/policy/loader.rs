//! Load policies from CSV, per SPEC_FULL.md §6's input format:
//! `policy_id,age,gender,sum_assured,premium,term,product_type[,underwriting_class,...]`.
//!
//! Malformed rows are rejected with the offending line number rather than a
//! bare parse error, per §4.A.

use super::{Gender, Policy, PolicySet, ProductType};
use crate::error::EngineError;
use csv::Reader;
use std::path::Path;

/// Raw CSV row, deserialized by header name so column order is irrelevant.
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    policy_id: u64,
    age: u8,
    gender: String,
    sum_assured: f64,
    premium: f64,
    term: u8,
    product_type: String,
    #[serde(default)]
    underwriting_class: String,
}

fn parse_gender(raw: &str) -> Result<Gender, String> {
    match raw {
        "M" | "Male" => Ok(Gender::Male),
        "F" | "Female" => Ok(Gender::Female),
        other => Err(format!("unknown gender '{other}'")),
    }
}

fn parse_product_type(raw: &str) -> Result<ProductType, String> {
    match raw {
        "Term" => Ok(ProductType::Term),
        "WholeLife" => Ok(ProductType::WholeLife),
        "Endowment" => Ok(ProductType::Endowment),
        other => Err(format!("unknown product_type '{other}'")),
    }
}

impl CsvRow {
    fn to_policy(&self) -> Result<Policy, String> {
        let gender = parse_gender(&self.gender)?;
        let product_type = parse_product_type(&self.product_type)?;
        let policy = Policy {
            policy_id: self.policy_id,
            age: self.age,
            gender,
            sum_assured: self.sum_assured,
            premium: self.premium,
            term: self.term,
            product_type,
            underwriting_class: self.underwriting_class.clone(),
            attributes: None,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Load policies from a CSV file at `path`, reporting the offending line on
/// the first malformed row.
pub fn load_policies<P: AsRef<Path>>(path: P) -> Result<PolicySet, EngineError> {
    let path_str = path.as_ref().display().to_string();
    let file = std::fs::File::open(path.as_ref()).map_err(|e| EngineError::Configuration {
        message: format!("cannot open policies file: {e}"),
        path: Some(path_str.clone()),
    })?;
    load_policies_from_reader(file, &path_str)
}

/// Load policies from any reader (e.g. an in-memory buffer handed over the
/// bus, or a network stream).
pub fn load_policies_from_reader<R: std::io::Read>(
    reader: R,
    source_name: &str,
) -> Result<PolicySet, EngineError> {
    let mut csv_reader = Reader::from_reader(reader);
    let mut policies = Vec::new();

    for result in csv_reader.deserialize::<CsvRow>() {
        let line = csv_reader.position().line();
        let row = result.map_err(|e| EngineError::MalformedRow {
            path: source_name.to_string(),
            line,
            source: Box::new(e),
        })?;
        let policy = row.to_policy().map_err(|message| EngineError::MalformedRow {
            path: source_name.to_string(),
            line,
            source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
        })?;
        policies.push(policy);
    }

    Ok(PolicySet::new(policies))
}

/// Load policies from a dense columnar binary-ish representation where
/// gender and product_type are encoded numerically (gender: 0=M,1=F;
/// product_type: 0=Term,1=WholeLife,2=Endowment), per §6.
pub fn load_policies_columnar(
    policy_ids: &[u64],
    ages: &[u8],
    genders: &[u8],
    sum_assureds: &[f64],
    premiums: &[f64],
    terms: &[u8],
    product_types: &[u8],
) -> Result<PolicySet, EngineError> {
    let n = policy_ids.len();
    if [ages.len(), genders.len(), sum_assureds.len(), premiums.len(), terms.len(), product_types.len()]
        .iter()
        .any(|&len| len != n)
    {
        return Err(EngineError::Configuration {
            message: "columnar policy arrays have mismatched lengths".to_string(),
            path: None,
        });
    }

    let mut policies = Vec::with_capacity(n);
    for i in 0..n {
        let gender = match genders[i] {
            0 => Gender::Male,
            1 => Gender::Female,
            other => {
                return Err(EngineError::MalformedRow {
                    path: "<columnar>".to_string(),
                    line: i as u64 + 1,
                    source: format!("unknown gender code {other}").into(),
                })
            }
        };
        let product_type = match product_types[i] {
            0 => ProductType::Term,
            1 => ProductType::WholeLife,
            2 => ProductType::Endowment,
            other => {
                return Err(EngineError::MalformedRow {
                    path: "<columnar>".to_string(),
                    line: i as u64 + 1,
                    source: format!("unknown product_type code {other}").into(),
                })
            }
        };
        let policy = Policy {
            policy_id: policy_ids[i],
            age: ages[i],
            gender,
            sum_assured: sum_assureds[i],
            premium: premiums[i],
            term: terms[i],
            product_type,
            underwriting_class: String::new(),
            attributes: None,
        };
        policy.validate().map_err(|message| EngineError::MalformedRow {
            path: "<columnar>".to_string(),
            line: i as u64 + 1,
            source: message.into(),
        })?;
        policies.push(policy);
    }

    Ok(PolicySet::new(policies))
}
