//! UDF (user-defined adjustment function) host, per SPEC_FULL.md §4.G.
//!
//! A UDF host is queried synchronously, once per (policy, year), for a
//! mortality and a lapse multiplier. Failures, timeouts, and out-of-range
//! returns all degrade to a multiplier of `1.0` and are counted as
//! warnings rather than propagated as errors -- the UDF contract is
//! explicitly best-effort.

mod host;

pub use host::{NoopUdfHost, UdfCall, UdfHost, UdfOutcome};
