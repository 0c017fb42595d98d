//! Exponential backoff with optional jitter.

use std::time::Duration;

/// Stateful exponential delay calculator.
///
/// Each call to [`Backoff::next_delay`] returns the wait before the next
/// attempt and advances an internal attempt counter:
///
/// ```text
/// delay = min_delay * factor ^ attempts
/// ```
///
/// With jitter enabled, the delay is replaced by a uniformly random value in
/// `[min_delay, delay)`, so jittered waits never drop below `min_delay`.
///
/// When the unjittered delay exceeds `max_delay`, `max_delay` is returned and
/// the counter stays where it is, so the sequence stays pinned to the ceiling
/// instead of growing an exponent nobody uses.
///
/// A `Backoff` belongs to exactly one retry sequence at a time. It is cheap to
/// clone; a clone carries the current counter, so call [`Backoff::reset`] (or
/// clone an unused instance) to start an independent sequence.
///
/// # Examples
///
/// ```rust
/// use steadfast::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
///
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(400));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(800));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// assert_eq!(backoff.attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    min_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff growing from `min_delay` by `factor` per attempt, capped at `max_delay`.
    ///
    /// Values are taken as given. A zero factor or zero minimum simply yields
    /// zero-length waits; a factor that produces an unrepresentable delay
    /// (NaN, negative) saturates to `max_delay`.
    pub fn new(min_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            factor,
            jitter: false,
            attempts: 0,
        }
    }

    /// Enable or disable jitter.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use steadfast::Backoff;
    /// use std::time::Duration;
    ///
    /// let min = Duration::from_millis(50);
    /// let mut backoff = Backoff::new(min, Duration::from_secs(5), 3.0).with_jitter(true);
    ///
    /// for _ in 0..4 {
    ///     assert!(backoff.next_delay() >= min);
    /// }
    /// ```
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Lower bound of every delay.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Ceiling of every delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor applied per attempt.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Whether jitter is enabled.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Number of delays computed below the ceiling so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Rewind the attempt counter for a new retry sequence.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Compute the delay before the next attempt and advance the counter.
    pub fn next_delay(&mut self) -> Duration {
        // Whole nanoseconds are exact in f64 up to ~104 days, which keeps the
        // unjittered sequence free of rounding drift.
        let min = self.min_delay.as_nanos() as f64;
        let max = self.max_delay.as_nanos() as f64;
        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        let raw = min * self.factor.powi(exponent);

        if raw > max || !raw.is_finite() || raw < 0.0 {
            return self.max_delay;
        }

        let nanos = if self.jitter {
            min + rand::random::<f64>() * (raw - min)
        } else {
            raw
        };

        self.attempts = self.attempts.saturating_add(1);
        if nanos < u64::MAX as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            // Past ~584 years the delay no longer fits in u64 nanoseconds.
            Duration::try_from_secs_f64(nanos / 1e9).map_or(self.max_delay, |delay| delay.min(self.max_delay))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unjittered(backoff: &Backoff) -> Backoff {
        backoff.clone().with_jitter(false)
    }

    #[test]
    fn test_exponential_sequence() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(60), 3.0);

        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(30));
        assert_eq!(backoff.next_delay(), Duration::from_millis(90));
        assert_eq!(backoff.next_delay(), Duration::from_millis(270));
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn test_ceiling_freezes_counter() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0);

        // 1s, 2s, 4s are below the ceiling; 8s is not.
        for _ in 0..3 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempts(), 3);

        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(5));
            assert_eq!(backoff.attempts(), 3);
        }
    }

    #[test]
    fn test_factor_one_is_fixed_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(1), 1.0);

        for _ in 0..20 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        }
        assert_eq!(backoff.attempts(), 20);
    }

    #[test]
    fn test_zero_factor_and_zero_min() {
        let mut zero_factor = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 0.0);
        // factor^0 == 1, so the first delay is still the minimum
        assert_eq!(zero_factor.next_delay(), Duration::from_millis(100));
        assert_eq!(zero_factor.next_delay(), Duration::ZERO);

        let mut zero_min = Backoff::new(Duration::ZERO, Duration::from_secs(1), 2.0);
        assert_eq!(zero_min.next_delay(), Duration::ZERO);
        assert_eq!(zero_min.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_unrepresentable_delay_saturates() {
        let max = Duration::from_secs(2);

        let mut nan = Backoff::new(Duration::from_millis(1), max, f64::NAN);
        nan.next_delay();
        assert_eq!(nan.next_delay(), max);

        let mut negative = Backoff::new(Duration::from_millis(1), max, -2.0);
        negative.next_delay();
        assert_eq!(negative.next_delay(), max);

        let mut huge = Backoff::new(Duration::from_secs(1), Duration::MAX, f64::MAX);
        huge.next_delay();
        assert_eq!(huge.next_delay(), Duration::MAX);
    }

    #[test]
    fn test_delay_beyond_u64_nanos_keeps_minimum() {
        let min = Duration::from_secs(1_000 * 365 * 86_400);
        let mut backoff = Backoff::new(min, Duration::MAX, 2.0);

        assert_eq!(backoff.next_delay(), min);
        assert_eq!(backoff.next_delay(), min * 2);
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let min = Duration::from_millis(20);
        let mut jittered = Backoff::new(min, Duration::from_secs(3600), 1.5).with_jitter(true);

        for _ in 0..1000 {
            let mut reference = unjittered(&jittered);
            let ceiling = reference.next_delay();
            let delay = jittered.next_delay();

            assert!(delay >= min, "{delay:?} below minimum {min:?}");
            assert!(
                delay < ceiling || ceiling == min,
                "{delay:?} not below unjittered {ceiling:?}"
            );

            if jittered.attempts() > 10 {
                jittered.reset();
            }
        }
    }

    #[test]
    fn test_jitter_varies() {
        let mut delays = Vec::new();
        for _ in 0..20 {
            let mut backoff =
                Backoff::new(Duration::from_millis(10), Duration::from_secs(60), 10.0).with_jitter(true);
            backoff.next_delay();
            delays.push(backoff.next_delay());
        }

        let all_same = delays.windows(2).all(|w| w[0] == w[1]);
        assert!(!all_same, "With randomization, delays should vary");
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1), 2.0);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(5));
    }

    proptest! {
        #[test]
        fn prop_unjittered_is_non_decreasing_until_clamped(
            min_ms in 1u64..1_000,
            max_ms in 1_000u64..600_000,
            factor in 1.0f64..4.0,
        ) {
            let max = Duration::from_millis(max_ms);
            let mut backoff = Backoff::new(Duration::from_millis(min_ms), max, factor);

            let mut previous = Duration::ZERO;
            for _ in 0..64 {
                let delay = backoff.next_delay();
                prop_assert!(delay >= previous);
                prop_assert!(delay <= max);
                previous = delay;
            }
        }

        #[test]
        fn prop_jitter_bounded_by_min_and_unjittered(
            min_ms in 1u64..500,
            factor in 1.1f64..3.0,
            steps in 0usize..12,
        ) {
            let min = Duration::from_millis(min_ms);
            let mut backoff = Backoff::new(min, Duration::from_secs(86_400), factor).with_jitter(true);
            for _ in 0..steps {
                backoff.next_delay();
            }

            let ceiling = unjittered(&backoff).next_delay();
            let delay = backoff.next_delay();
            prop_assert!(delay >= min);
            prop_assert!(delay < ceiling || ceiling == min);
        }
    }
}
