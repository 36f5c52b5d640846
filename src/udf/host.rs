//! UDF host trait and a bounded-time invocation helper, per §4.G.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// The inputs passed to a UDF on each per-year query.
#[derive(Debug, Clone, Copy)]
pub struct UdfCall {
    pub policy_id: u64,
    pub year: u32,
    pub lives: f64,
    pub rate: f64,
}

/// The result of a single UDF invocation, before the caller has checked it
/// against the `[0, 10]` contract range.
#[derive(Debug, Clone)]
pub enum UdfOutcome {
    Multiplier(f64),
    Failed(String),
}

/// A named external adjustment function host. Implementations must be
/// bounded-time, must not mutate policy state, and should be pure or
/// idempotent (§4.G).
///
/// The two required methods are scalar, per-call primitives; `adjust_batch`
/// is a default method layered over them the same way
/// `ReserveCalculator::calculate_reserves_batch` is layered over
/// `calculate_reserve` -- implementations that can genuinely amortise many
/// `(policy, year)` calls into one external round trip should override it.
pub trait UdfHost: Send + Sync {
    fn adjust_mortality(&self, call: &UdfCall) -> UdfOutcome;
    fn adjust_lapse(&self, call: &UdfCall) -> UdfOutcome;

    /// Bounded-time default, 1000ms per §4.G.
    fn timeout_ms(&self) -> u64 {
        1000
    }

    fn adjust_mortality_batch(&self, calls: &[UdfCall]) -> Vec<UdfOutcome> {
        calls.iter().map(|c| self.adjust_mortality(c)).collect()
    }

    fn adjust_lapse_batch(&self, calls: &[UdfCall]) -> Vec<UdfOutcome> {
        calls.iter().map(|c| self.adjust_lapse(c)).collect()
    }
}

/// A host with no UDFs installed: every call returns a 1.0 multiplier
/// without crossing a thread boundary. The kernel's default when no UDF
/// host is configured.
pub struct NoopUdfHost;

impl UdfHost for NoopUdfHost {
    fn adjust_mortality(&self, _call: &UdfCall) -> UdfOutcome {
        UdfOutcome::Multiplier(1.0)
    }

    fn adjust_lapse(&self, _call: &UdfCall) -> UdfOutcome {
        UdfOutcome::Multiplier(1.0)
    }
}

/// Run `f` on a worker thread and wait at most `timeout_ms` for it to
/// finish. Implementations wrapping a truly external (FFI, subprocess,
/// network) UDF should use this to honor the bounded-time contract rather
/// than trusting the callee to respect a deadline on its own.
pub fn invoke_bounded<F>(timeout_ms: u64, f: F) -> UdfOutcome
where
    F: FnOnce() -> f64 + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(value) => UdfOutcome::Multiplier(value),
        Err(_) => UdfOutcome::Failed(format!("udf call exceeded {timeout_ms}ms timeout")),
    }
}

/// Resolve a raw `UdfOutcome` against the `[0, 10]` contract range,
/// returning the multiplier to use and, if the outcome degraded, a warning
/// message (per §4.G: out-of-range or failed returns degrade to 1.0).
pub fn resolve_multiplier(outcome: UdfOutcome) -> (f64, Option<String>) {
    match outcome {
        UdfOutcome::Multiplier(m) if (0.0..=10.0).contains(&m) => (m, None),
        UdfOutcome::Multiplier(m) => (1.0, Some(format!("multiplier {m} out of range [0, 10]"))),
        UdfOutcome::Failed(message) => (1.0, Some(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_host_always_returns_one() {
        let host = NoopUdfHost;
        let call = UdfCall { policy_id: 1, year: 1, lives: 1.0, rate: 0.04 };
        assert!(matches!(host.adjust_mortality(&call), UdfOutcome::Multiplier(m) if m == 1.0));
        assert!(matches!(host.adjust_lapse(&call), UdfOutcome::Multiplier(m) if m == 1.0));
    }

    #[test]
    fn test_resolve_in_range_passes_through() {
        let (m, warning) = resolve_multiplier(UdfOutcome::Multiplier(2.5));
        assert_eq!(m, 2.5);
        assert!(warning.is_none());
    }

    #[test]
    fn test_resolve_out_of_range_degrades_to_one() {
        let (m, warning) = resolve_multiplier(UdfOutcome::Multiplier(11.0));
        assert_eq!(m, 1.0);
        assert!(warning.is_some());
    }

    #[test]
    fn test_resolve_failed_degrades_to_one() {
        let (m, warning) = resolve_multiplier(UdfOutcome::Failed("boom".to_string()));
        assert_eq!(m, 1.0);
        assert!(warning.is_some());
    }

    #[test]
    fn test_invoke_bounded_within_timeout() {
        let outcome = invoke_bounded(100, || 1.5);
        assert!(matches!(outcome, UdfOutcome::Multiplier(m) if m == 1.5));
    }

    #[test]
    fn test_invoke_bounded_times_out() {
        let outcome = invoke_bounded(20, || {
            thread::sleep(Duration::from_millis(200));
            1.0
        });
        assert!(matches!(outcome, UdfOutcome::Failed(_)));
    }
}
