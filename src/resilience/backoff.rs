//! Exponential reset-timeout growth with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Grow the reset timeout after a failed half-open trial.
///
/// Returns `min(current * factor, max)`. Overflow saturates at `max`.
pub fn next_reset_timeout(current: Duration, factor: f64, max: Duration) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * factor)
        .map(|grown| grown.min(max))
        .unwrap_or(max)
}

/// Stretch a reset delay by a random fraction in `[0, random_factor)`.
///
/// The stored reset timeout is never jittered; only the delay handed to the
/// scheduler is.
pub fn apply_random_factor(delay: Duration, random_factor: f64) -> Duration {
    if random_factor <= 0.0 {
        return delay;
    }

    let jitter = rand::thread_rng().gen_range(0.0..random_factor);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter)).unwrap_or(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth() {
        let max = Duration::from_secs(10);

        let b1 = next_reset_timeout(Duration::from_secs(1), 2.0, max);
        assert_eq!(b1, Duration::from_secs(2));

        let b2 = next_reset_timeout(b1, 2.0, max);
        assert_eq!(b2, Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let max = Duration::from_secs(10);
        assert_eq!(next_reset_timeout(Duration::from_secs(8), 2.0, max), max);
        assert_eq!(next_reset_timeout(Duration::MAX, 2.0, max), max);
    }

    #[test]
    fn test_factor_of_one_keeps_timeout() {
        let t = Duration::from_millis(1500);
        assert_eq!(next_reset_timeout(t, 1.0, Duration::from_secs(60)), t);
    }

    #[test]
    fn test_random_factor_bounds() {
        let base = Duration::from_millis(1000);
        assert_eq!(apply_random_factor(base, 0.0), base);

        for _ in 0..50 {
            let d = apply_random_factor(base, 0.5);
            assert!(d >= base);
            assert!(d < Duration::from_millis(1500));
        }
    }
}
