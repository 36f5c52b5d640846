//! Deterministic outer-path archetypes, per SPEC_FULL.md §4.B.
//!
//! The archetype assigned to outer index `o` is fixed by position, not by
//! seed -- the same `outer_paths` count always yields the same ordered list
//! of shapes.

/// One of the ten fixed outer-path shapes. Index order matches the table
/// referenced by §4.B; callers select archetypes by outer index, wrapping
/// if `outer_paths` exceeds the archetype count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Flat,
    StressUp,
    StressDown,
    MeanReverting,
    VShape,
    Inverted,
    Drift,
    Inflation,
    Deflation,
    Oscillating,
}

pub const ARCHETYPE_ORDER: [Archetype; 10] = [
    Archetype::Flat,
    Archetype::StressUp,
    Archetype::StressDown,
    Archetype::MeanReverting,
    Archetype::VShape,
    Archetype::Inverted,
    Archetype::Drift,
    Archetype::Inflation,
    Archetype::Deflation,
    Archetype::Oscillating,
];

/// Assign the archetype for outer index `o`, independent of seed.
pub fn archetype_for(outer: u32) -> Archetype {
    ARCHETYPE_ORDER[(outer as usize) % ARCHETYPE_ORDER.len()]
}

/// The outer skeleton value `b_t` for year `t` (1-indexed), given the
/// archetype and the base rate `r0`.
pub fn skeleton_rate(archetype: Archetype, year: u32, r0: f64) -> f64 {
    let t = year as f64;
    let rate = match archetype {
        Archetype::Flat => r0,
        Archetype::StressUp => r0 + 0.01 * t.min(10.0),
        Archetype::StressDown => r0 - 0.01 * t.min(10.0),
        Archetype::MeanReverting => r0,
        Archetype::VShape => {
            let half = 10.0;
            if t <= half {
                r0 - 0.005 * t
            } else {
                r0 - 0.005 * half + 0.005 * (t - half)
            }
        }
        Archetype::Inverted => {
            let half = 10.0;
            if t <= half {
                r0 + 0.005 * t
            } else {
                r0 + 0.005 * half - 0.005 * (t - half)
            }
        }
        Archetype::Drift => r0 + 0.0015 * t,
        Archetype::Inflation => r0 + 0.002 * t.min(15.0),
        Archetype::Deflation => r0 - 0.002 * t.min(15.0),
        Archetype::Oscillating => r0 + 0.01 * (t * std::f64::consts::PI / 5.0).sin(),
    };
    rate.max(crate::scenario::MIN_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archetype_for_is_position_fixed() {
        assert_eq!(archetype_for(0), Archetype::Flat);
        assert_eq!(archetype_for(1), Archetype::StressUp);
        assert_eq!(archetype_for(9), Archetype::Oscillating);
    }

    #[test]
    fn test_archetype_wraps_beyond_table() {
        assert_eq!(archetype_for(10), archetype_for(0));
    }

    #[test]
    fn test_flat_is_constant() {
        assert_eq!(skeleton_rate(Archetype::Flat, 1, 0.04), 0.04);
        assert_eq!(skeleton_rate(Archetype::Flat, 50, 0.04), 0.04);
    }

    #[test]
    fn test_skeleton_floors_at_min_rate() {
        let r = skeleton_rate(Archetype::StressDown, 10, 0.001);
        assert!(r >= crate::scenario::MIN_RATE);
    }
}
