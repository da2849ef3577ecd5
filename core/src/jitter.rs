//! Bounded random perturbation of nominal values.
//!
//! Every scheduling point (deferred stop, first stress round) and every numeric
//! stress parameter goes through here so that many independent schedules do not
//! fire in lock step.

use std::time::Duration;

use rand::Rng;

/// Jitter applied to executor delays.
pub const DEFAULT_DELAY_JITTER_PCT: u32 = 20;

fn bounds(value: f64, jitter_pct: u32) -> (f64, f64) {
    let pct = f64::from(jitter_pct.min(100)) / 100.0;
    (value * (1.0 - pct), value * (1.0 + pct))
}

/// Uniform value in `[v(1-j/100), v(1+j/100)]`, never negative.
///
/// Returns `value` untouched when either the value or the jitter is not positive.
pub fn jitter_f64_with<R: Rng + ?Sized>(rng: &mut R, value: f64, jitter_pct: u32) -> f64 {
    if jitter_pct == 0 || value <= 0.0 || !value.is_finite() {
        return value;
    }
    let (lo, hi) = bounds(value, jitter_pct);
    if lo >= hi {
        return value;
    }
    rng.gen_range(lo..=hi).max(0.0)
}

pub fn jitter_f64(value: f64, jitter_pct: u32) -> f64 {
    jitter_f64_with(&mut rand::thread_rng(), value, jitter_pct)
}

/// Integer flavour for quantities that must stay positive (worker counts,
/// durations in whole seconds). Draws from the integers inside the jitter
/// interval and never returns less than 1.
pub fn jitter_count_with<R: Rng + ?Sized>(rng: &mut R, value: i64, jitter_pct: u32) -> i64 {
    if jitter_pct == 0 || value <= 0 {
        return value;
    }
    let (lo, hi) = bounds(value as f64, jitter_pct);
    // `value` itself always lies in [ceil(lo), floor(hi)], so the range is never empty.
    let lo = (lo.ceil() as i64).min(value);
    let hi = (hi.floor() as i64).max(value);
    rng.gen_range(lo..=hi).max(1)
}

pub fn jitter_count(value: i64, jitter_pct: u32) -> i64 {
    jitter_count_with(&mut rand::thread_rng(), value, jitter_pct)
}

/// Delay for a task scheduled `secs` seconds out. Zero means "run now" and is
/// never jittered.
pub fn jitter_delay(secs: u64, jitter_pct: u32) -> Duration {
    if secs == 0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(jitter_f64(secs as f64, jitter_pct)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_float_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for value in [0.5, 1.0, 10.0, 300.0] {
            for pct in [1u32, 20, 50, 100] {
                for _ in 0..200 {
                    let v = jitter_f64_with(&mut rng, value, pct);
                    let p = f64::from(pct) / 100.0;
                    assert!(v >= value * (1.0 - p) - 1e-9, "{v} below range");
                    assert!(v <= value * (1.0 + p) + 1e-9, "{v} above range");
                    assert!(v >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(jitter_f64_with(&mut rng, 42.5, 0), 42.5);
        assert_eq!(jitter_count_with(&mut rng, 42, 0), 42);
    }

    #[test]
    fn test_non_positive_values_pass_through() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(jitter_f64_with(&mut rng, 0.0, 50), 0.0);
        assert_eq!(jitter_f64_with(&mut rng, -3.0, 50), -3.0);
        assert_eq!(jitter_count_with(&mut rng, 0, 50), 0);
    }

    #[test]
    fn test_count_jitter_bounds_and_minimum() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let v = jitter_count_with(&mut rng, 10, 20);
            assert!((8..=12).contains(&v), "{v}");
        }
        for _ in 0..100 {
            assert!(jitter_count_with(&mut rng, 1, 100) >= 1);
        }
    }

    #[test]
    fn test_count_jitter_over_hundred_percent_is_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let v = jitter_count_with(&mut rng, 4, 400);
            assert!((1..=8).contains(&v), "{v}");
        }
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        assert_eq!(jitter_delay(0, 20), Duration::ZERO);
        let d = jitter_delay(10, 20);
        assert!(d >= Duration::from_secs(8) && d <= Duration::from_secs(12));
    }

    #[test]
    fn test_huge_delay_saturates() {
        assert_eq!(jitter_delay(0, 20), Duration::ZERO);
        let d = jitter_delay(u64::MAX, 20);
        assert!(d >= Duration::from_secs(u64::MAX / 2));
    }
}
