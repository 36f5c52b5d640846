//! Policy data structures for the annual term/whole-life/endowment model.

use serde::{Deserialize, Serialize};

/// Gender of the policyholder, used to index `MortalityTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// Product type, determining which benefit a claim or maturity pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    /// Pays a death benefit during the term only; no maturity value.
    Term,
    /// Pays a death benefit for the policyholder's whole life.
    WholeLife,
    /// Pays a death benefit during the term, or the sum assured at maturity.
    Endowment,
}

/// A single policy record in the portfolio.
///
/// Immutable once loaded: the kernel reads policies by shared reference
/// across workers, never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy identifier.
    pub policy_id: u64,

    /// Issue age of the policyholder.
    pub age: u8,

    /// Gender of the policyholder.
    pub gender: Gender,

    /// Sum assured paid on death (and, for `Endowment`, at maturity).
    pub sum_assured: f64,

    /// Annual premium.
    pub premium: f64,

    /// Policy term in years, `<= 50`.
    pub term: u8,

    /// Product type.
    pub product_type: ProductType,

    /// Categorical underwriting class (e.g. "Standard", "Preferred").
    #[serde(default)]
    pub underwriting_class: String,

    /// Optional string-keyed attributes, visible to UDF adjustment
    /// functions but otherwise opaque to the kernel.
    #[serde(default)]
    pub attributes: Option<std::collections::HashMap<String, String>>,
}

impl Policy {
    /// Construct a policy, enforcing the data-model invariants.
    ///
    /// Returns `None` if `age + term > 121`, or `sum_assured`/`premium` are
    /// negative.
    pub fn new(
        policy_id: u64,
        age: u8,
        gender: Gender,
        sum_assured: f64,
        premium: f64,
        term: u8,
        product_type: ProductType,
    ) -> Option<Self> {
        let policy = Self {
            policy_id,
            age,
            gender,
            sum_assured,
            premium,
            term,
            product_type,
            underwriting_class: String::new(),
            attributes: None,
        };
        policy.validate().ok()?;
        Some(policy)
    }

    /// Check the data-model invariants without constructing a new value.
    pub fn validate(&self) -> Result<(), String> {
        if self.age as u32 + self.term as u32 > 121 {
            return Err(format!(
                "policy {}: age ({}) + term ({}) exceeds 121",
                self.policy_id, self.age, self.term
            ));
        }
        if self.sum_assured < 0.0 {
            return Err(format!(
                "policy {}: sum_assured ({}) is negative",
                self.policy_id, self.sum_assured
            ));
        }
        if self.premium < 0.0 {
            return Err(format!(
                "policy {}: premium ({}) is negative",
                self.policy_id, self.premium
            ));
        }
        Ok(())
    }

    /// Attained age at the start of policy year `t` (1-indexed).
    pub fn attained_age(&self, policy_year: u32) -> u8 {
        self.age.saturating_add((policy_year.saturating_sub(1)) as u8)
    }

    /// Whether the policy pays a maturity benefit at the end of its term
    /// (only `Endowment` does).
    pub fn pays_maturity_benefit(&self) -> bool {
        matches!(self.product_type, ProductType::Endowment)
    }
}

/// A contiguous, cache-friendly collection of policies loaded once per
/// pipeline run and shared read-only across workers thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Policy> {
        self.policies.iter()
    }

    pub fn as_slice(&self) -> &[Policy] {
        &self.policies
    }
}

impl<'a> IntoIterator for &'a PolicySet {
    type Item = &'a Policy;
    type IntoIter = std::slice::Iter<'a, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.iter()
    }
}
