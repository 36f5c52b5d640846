//! Summary-statistics formulas over a scenario-NPV vector, per §4.D.

use super::result::{Percentiles, Statistics};

/// Mean, Bessel-corrected (n-1) standard deviation, percentiles, and
/// `cte_95` over `npvs`. Does not mutate `npvs`; sorts an internal copy.
///
/// `npvs` is expected non-empty; an empty slice yields an all-zero
/// `Statistics` rather than panicking, since a zero-scenario run is a
/// degenerate but not erroneous configuration.
pub fn compute_statistics(npvs: &[f64]) -> Statistics {
    if npvs.is_empty() {
        return Statistics::default();
    }

    let n = npvs.len();
    let mean = npvs.iter().sum::<f64>() / n as f64;

    let std_dev = if n > 1 {
        let sum_sq_dev: f64 = npvs.iter().map(|&x| (x - mean).powi(2)).sum();
        (sum_sq_dev / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    let mut sorted = npvs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let percentiles = Percentiles {
        p50: percentile(&sorted, 0.50),
        p75: percentile(&sorted, 0.75),
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
    };

    let cte_95 = conditional_tail_expectation(&sorted, 0.05);

    Statistics {
        mean_npv: mean,
        std_dev,
        percentiles,
        cte_95,
    }
}

/// Linear interpolation at fractional rank `i = p * (n - 1)` on an
/// already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}

/// `cte_95 = mean(lowest 5% of sorted npvs)` per §9's resolution of the
/// open question (insurer-loss tail: lowest values).
fn conditional_tail_expectation(sorted: &[f64], tail_fraction: f64) -> f64 {
    let n = sorted.len();
    let tail_count = ((n as f64 * tail_fraction).ceil() as usize).max(1).min(n);
    let tail_sum: f64 = sorted[..tail_count].iter().sum();
    tail_sum / tail_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std_dev() {
        let stats = compute_statistics(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(stats.mean_npv, 5.0, epsilon = 1e-9);
        assert_relative_eq!(stats.std_dev, 2.13809, epsilon = 1e-4);
    }

    #[test]
    fn test_percentile_p50_on_odd_count() {
        let stats = compute_statistics(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(stats.percentiles.p50, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cte_95_is_lowest_tail() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let stats = compute_statistics(&values);
        // Lowest 5% of 1..=100 is {1..=5}, mean = 3.0.
        assert_relative_eq!(stats.cte_95, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_scenario_has_zero_std_dev() {
        let stats = compute_statistics(&[42.0]);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.percentiles.p50, 42.0);
        assert_eq!(stats.cte_95, 42.0);
    }

    #[test]
    fn test_empty_is_zeroed_not_panicking() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.mean_npv, 0.0);
    }
}
