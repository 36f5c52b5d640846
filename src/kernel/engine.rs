//! The per-(policy, scenario) annual year loop, per SPEC_FULL.md §4.C.

use super::state::KernelState;
use crate::assumptions::Assumptions;
use crate::policy::Policy;
use crate::udf::{resolve_multiplier, UdfCall, UdfHost};
use serde::{Deserialize, Serialize};

/// Discounting convention, an explicit config toggle per §9's resolution of
/// the open question. `EndOfYear` is implemented; `MidYear` is reserved for
/// a future kernel revision and is rejected at `KernelConfig::validate`
/// rather than silently treated as `EndOfYear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiscountConvention {
    #[default]
    EndOfYear,
    MidYear,
}

/// Per-run kernel configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelConfig {
    pub discount_convention: DiscountConvention,
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.discount_convention == DiscountConvention::MidYear {
            return Err(crate::error::EngineError::Configuration {
                message: "mid-year discounting is a reserved config value, not yet implemented"
                    .to_string(),
                path: None,
            });
        }
        Ok(())
    }
}

/// Outcome of projecting one policy under one scenario: its NPV
/// contribution plus any UDF warnings raised along the way.
#[derive(Debug, Clone, Copy)]
pub struct KernelOutcome {
    pub npv: f64,
    pub udf_warnings: u32,
}

/// Project a single policy under a single scenario's rate path, returning
/// its NPV contribution to that scenario.
///
/// `scenario_rates` must have at least `policy.term` entries; only the
/// first `policy.term` years are consulted, per the early-exit rule.
pub fn project_policy_scenario(
    policy: &Policy,
    scenario_rates: &[f64],
    assumptions: &Assumptions,
    config: &KernelConfig,
    udf: Option<&dyn UdfHost>,
) -> KernelOutcome {
    let mut state = KernelState::new();
    let mut udf_warnings = 0u32;

    if policy.term == 0 {
        return KernelOutcome { npv: 0.0, udf_warnings: 0 };
    }

    for t in 1..=policy.term as u32 {
        if state.is_exhausted() {
            break;
        }

        let current_age = policy.attained_age(t);
        let mut qx = assumptions.qx(current_age, policy.gender);
        let mut lapse_rate = assumptions.lapse_rate(t);

        let rate = scenario_rates
            .get((t - 1) as usize)
            .copied()
            .unwrap_or(crate::scenario::MIN_RATE);

        if let Some(host) = udf {
            let call = UdfCall {
                policy_id: policy.policy_id,
                year: t,
                lives: state.lives,
                rate,
            };
            let (mortality_mult, mortality_warning) =
                resolve_multiplier(host.adjust_mortality(&call));
            let (lapse_mult, lapse_warning) = resolve_multiplier(host.adjust_lapse(&call));
            qx = (qx * mortality_mult).min(1.0);
            lapse_rate = (lapse_rate * lapse_mult).min(1.0);
            if mortality_warning.is_some() {
                udf_warnings += 1;
            }
            if lapse_warning.is_some() {
                udf_warnings += 1;
            }
        }

        let deaths = qx * state.lives;
        let lapses = lapse_rate * (state.lives - deaths);

        let premium_income = policy.premium * state.lives;
        let death_benefit = deaths * policy.sum_assured;
        let expense = if t == 1 {
            assumptions.first_year_expense(policy.premium)
        } else {
            assumptions.renewal_expense(policy.premium)
        } * state.lives;

        let cash_flow = premium_income - death_benefit - expense;

        state.advance_year(rate, cash_flow, deaths, lapses);
    }

    KernelOutcome { npv: state.npv, udf_warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{ExpenseAssumptions, LapseTable, MortalityTable};
    use crate::policy::{Gender, Policy, ProductType};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn zero_mortality_assumptions() -> Assumptions {
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
    fn test_scenario_1_flat_rate_zero_decrement() {
        let policy = Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap();
        let assumptions = zero_mortality_assumptions();
        let rates = vec![0.05; 20];
        let config = KernelConfig::default();

        let outcome = project_policy_scenario(&policy, &rates, &assumptions, &config, None);

        let expected: f64 = (1..=20).map(|t| 500.0 / 1.05_f64.powi(t)).sum();
        assert_relative_eq!(outcome.npv, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_scenario_2_constant_mortality_closed_form() {
        let policy = Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 20, ProductType::Term).unwrap();
        let mut rates = vec![(0.0, 0.0); crate::assumptions::MAX_AGE + 1];
        rates[crate::assumptions::MAX_AGE] = (1.0, 1.0);
        for age in 0..crate::assumptions::MAX_AGE {
            rates[age] = (0.01, 0.01);
        }
        let assumptions = Assumptions::new(
            MortalityTable::new(rates),
            LapseTable::flat(0.0),
            ExpenseAssumptions::new(0.0, 0.0, 0.0, 0.0),
        );
        let scenario_rates = vec![0.05; 20];
        let config = KernelConfig::default();

        let outcome = project_policy_scenario(&policy, &scenario_rates, &assumptions, &config, None);

        // Closed form: two-state decrement, lives_t = (1-q)^t, premium in,
        // death benefit out at q * lives_{t-1}.
        let mut lives = 1.0_f64;
        let mut df = 1.0_f64;
        let mut expected_npv = 0.0_f64;
        for _ in 1..=20 {
            df *= 1.0 / 1.05;
            let deaths = 0.01 * lives;
            let cf = 500.0 * lives - deaths * 100_000.0;
            expected_npv += cf * df;
            lives -= deaths;
        }
        assert_relative_eq!(outcome.npv, expected_npv, epsilon = 1e-9);
    }

    #[test]
    fn test_term_zero_yields_zero_npv() {
        let policy = Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, 0, ProductType::Term).unwrap();
        let assumptions = zero_mortality_assumptions();
        let config = KernelConfig::default();
        let outcome = project_policy_scenario(&policy, &[], &assumptions, &config, None);
        assert_eq!(outcome.npv, 0.0);
    }

    #[test]
    fn test_qx_one_exhausts_lives_in_one_year() {
        let policy = Policy::new(1, 120, Gender::Male, 100_000.0, 500.0, 1, ProductType::Term).unwrap();
        let assumptions = Assumptions::synthetic_default();
        let config = KernelConfig::default();
        // qx(120) == 1.0 in the synthetic table, so all lives exit in year 1.
        let outcome = project_policy_scenario(&policy, &[0.05], &assumptions, &config, None);
        assert!(outcome.npv.is_finite());
    }

    #[test]
    fn test_zero_premium_zero_sum_assured_is_negative_expense_npv() {
        let policy = Policy::new(1, 30, Gender::Male, 0.0, 0.0, 5, ProductType::Term).unwrap();
        let assumptions = Assumptions::new(
            zero_mortality_assumptions().mortality,
            LapseTable::flat(0.0),
            ExpenseAssumptions::new(100.0, 10.0, 0.0, 0.0),
        );
        let rates = vec![0.05; 5];
        let config = KernelConfig::default();
        let outcome = project_policy_scenario(&policy, &rates, &assumptions, &config, None);
        assert!(outcome.npv < 0.0);
    }

    #[test]
    fn test_mid_year_convention_rejected_at_config_validation() {
        let config = KernelConfig {
            discount_convention: DiscountConvention::MidYear,
        };
        assert!(config.validate().is_err());
    }

    proptest! {
        /// Lives-in-force is non-increasing year over year, for any
        /// combination of rates (the kernel never resurrects lives).
        #[test]
        fn prop_lives_never_increase(
            qx in 0.0f64..1.0,
            lapse in 0.0f64..1.0,
            term in 1u8..30,
            rate in -0.5f64..0.5,
        ) {
            let policy = Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, term, ProductType::Term).unwrap();
            let mut rates_table = vec![(0.0, 0.0); crate::assumptions::MAX_AGE + 1];
            for entry in rates_table.iter_mut() {
                *entry = (qx, qx);
            }
            let assumptions = Assumptions::new(
                MortalityTable::new(rates_table),
                LapseTable::flat(lapse),
                ExpenseAssumptions::new(0.0, 0.0, 0.0, 0.0),
            );
            let scenario_rates = vec![rate; term as usize];
            let config = KernelConfig::default();

            let mut state = KernelState::new();
            let mut lives_trace = vec![1.0];
            for t in 1..=term as u32 {
                let current_age = policy.attained_age(t);
                let q = assumptions.qx(current_age, policy.gender);
                let l = assumptions.lapse_rate(t);
                let deaths = q * state.lives;
                let lapses = l * (state.lives - deaths);
                state.advance_year(rate, 0.0, deaths, lapses);
                lives_trace.push(state.lives);
                if state.is_exhausted() {
                    break;
                }
            }
            for window in lives_trace.windows(2) {
                prop_assert!(window[1] <= window[0] + 1e-12);
            }

            let outcome = project_policy_scenario(&policy, &scenario_rates, &assumptions, &config, None);
            prop_assert!(outcome.npv.is_finite());
        }

        /// Rates beyond `policy.term` must never affect the projected NPV:
        /// the kernel loop is bounded by `policy.term`, not `rates.len()`.
        #[test]
        fn prop_rates_past_term_are_ignored(
            term in 1u8..20,
            extra_years in 0u8..20,
            rate in -0.2f64..0.2,
            extra_rate in -0.2f64..0.2,
        ) {
            let policy = Policy::new(1, 30, Gender::Male, 100_000.0, 500.0, term, ProductType::Term).unwrap();
            let assumptions = zero_mortality_assumptions();
            let config = KernelConfig::default();

            let truncated_rates = vec![rate; term as usize];
            let mut extended_rates = truncated_rates.clone();
            extended_rates.extend(vec![extra_rate; extra_years as usize]);

            let outcome_truncated =
                project_policy_scenario(&policy, &truncated_rates, &assumptions, &config, None);
            let outcome_extended =
                project_policy_scenario(&policy, &extended_rates, &assumptions, &config, None);

            prop_assert!((outcome_truncated.npv - outcome_extended.npv).abs() < 1e-9);
        }
    }
}
