//! Delay strategies for the engine's two throttling concerns.
//!
//! [`PacingInterval`] produces the jittered delay inserted between batches of
//! a running workflow. Many workflow instances can be in flight at once
//! against the same upstream capture quota, so rather than sleeping a fixed
//! duration the interval samples uniformly between its bounds, which keeps
//! concurrently running instances from synchronising into bursts.
//!
//! [`BackoffStrategy`] computes how long a failing schedule should be
//! deferred before it is allowed to fire again. All of the constructors and
//! configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use pagewatch::pacing::BackoffStrategy;
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::exponential(TimeDelta::seconds(2))
//!     .with_max(TimeDelta::seconds(30));
//!
//! assert_eq!(strategy.backoff(1), TimeDelta::seconds(2));
//! assert_eq!(strategy.backoff(2), TimeDelta::seconds(4));
//! assert_eq!(strategy.backoff(4), TimeDelta::seconds(16));
//! assert_eq!(strategy.backoff(5), TimeDelta::seconds(30));
//! ```

use std::time::Duration;

use chrono::TimeDelta;
use rand::Rng;

use crate::config::ExecutorConfig;

/// Type that can be used to compute a delay from a failure count.
pub trait Strategy {
    /// Given the number of consecutive failures, returns the [`TimeDelta`]
    /// to wait before trying again.
    fn delay(&self, attempt: u32) -> TimeDelta;
}

/// Constant backoff: the same delay no matter the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant {
    delay: TimeDelta,
}

impl Strategy for Constant {
    fn delay(&self, _attempt: u32) -> TimeDelta {
        self.delay
    }
}

/// Exponential backoff: grows with each attempt, optionally capped via
/// [`BackoffStrategy::with_max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    base: TimeDelta,
    max: Option<TimeDelta>,
}

impl Strategy for Exponential {
    fn delay(&self, attempt: u32) -> TimeDelta {
        let mut seconds = self
            .base
            .num_seconds()
            .checked_pow(attempt)
            .unwrap_or(i64::MAX);
        if let Some(max) = self.max {
            seconds = seconds.min(max.num_seconds());
        }
        TimeDelta::seconds(seconds)
    }
}

/// A backoff strategy with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStrategy<S> {
    strategy: S,
    jitter: Option<Jitter>,
}

impl BackoffStrategy<Constant> {
    pub const fn constant(delay: TimeDelta) -> Self {
        Self {
            strategy: Constant { delay },
            jitter: None,
        }
    }
}

impl BackoffStrategy<Exponential> {
    pub const fn exponential(base: TimeDelta) -> Self {
        Self {
            strategy: Exponential { base, max: None },
            jitter: None,
        }
    }

    pub const fn with_max(self, max: TimeDelta) -> Self {
        Self {
            strategy: Exponential {
                base: self.strategy.base,
                max: Some(max),
            },
            jitter: self.jitter,
        }
    }
}

impl<S> BackoffStrategy<S> {
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

impl<S> BackoffStrategy<S>
where
    S: Strategy,
{
    /// The delay for the given consecutive failure count, never negative.
    pub fn backoff(&self, attempt: u32) -> TimeDelta {
        let delay = self.strategy.delay(attempt);
        match self.jitter {
            Some(jitter) => jitter.apply(delay).max(TimeDelta::zero()),
            None => delay.max(TimeDelta::zero()),
        }
    }
}

/// Jitter applied on top of a computed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Adds a uniformly sampled offset in `[-margin, +margin]`.
    Absolute(TimeDelta),
    /// Adds a uniformly sampled offset in `[-fraction, +fraction]` of the
    /// delay itself.
    Relative(f64),
}

impl Jitter {
    fn apply(&self, delay: TimeDelta) -> TimeDelta {
        let margin_ms = match self {
            Self::Absolute(margin) => margin.num_milliseconds(),
            Self::Relative(fraction) => (delay.num_milliseconds() as f64 * fraction) as i64,
        };
        if margin_ms <= 0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(-margin_ms..=margin_ms);
        delay + TimeDelta::milliseconds(offset)
    }
}

/// The jittered delay inserted between batches of a running workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingInterval {
    lower: TimeDelta,
    upper: TimeDelta,
}

impl PacingInterval {
    pub fn new(lower: TimeDelta, upper: TimeDelta) -> Self {
        let lower = lower.max(TimeDelta::zero());
        let upper = upper.max(lower);
        Self { lower, upper }
    }

    /// Samples a delay uniformly between the bounds.
    pub fn sample(&self) -> Duration {
        let lower_ms = self.lower.num_milliseconds();
        let upper_ms = self.upper.num_milliseconds();
        let delay_ms = if lower_ms == upper_ms {
            lower_ms
        } else {
            rand::thread_rng().gen_range(lower_ms..=upper_ms)
        };
        Duration::from_millis(delay_ms as u64)
    }
}

impl From<&ExecutorConfig> for PacingInterval {
    fn from(config: &ExecutorConfig) -> Self {
        Self::new(config.lower_bound, config.upper_bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_ignores_the_attempt() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(10));
        assert_eq!(strategy.backoff(1), TimeDelta::seconds(10));
        assert_eq!(strategy.backoff(7), TimeDelta::seconds(10));
    }

    #[test]
    fn exponential_grows_and_caps() {
        let strategy =
            BackoffStrategy::exponential(TimeDelta::seconds(3)).with_max(TimeDelta::seconds(60));
        assert_eq!(strategy.backoff(1), TimeDelta::seconds(3));
        assert_eq!(strategy.backoff(2), TimeDelta::seconds(9));
        assert_eq!(strategy.backoff(3), TimeDelta::seconds(27));
        assert_eq!(strategy.backoff(4), TimeDelta::seconds(60));
        assert_eq!(strategy.backoff(100), TimeDelta::seconds(60));
    }

    #[test]
    fn jitter_stays_within_its_margin() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(20))
            .with_jitter(Jitter::Absolute(TimeDelta::seconds(5)));
        for _ in 0..100 {
            let delay = strategy.backoff(1);
            assert!(delay >= TimeDelta::seconds(15));
            assert!(delay <= TimeDelta::seconds(25));
        }
    }

    #[test]
    fn relative_jitter_scales_with_the_delay() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(100))
            .with_jitter(Jitter::Relative(0.1));
        for _ in 0..100 {
            let delay = strategy.backoff(1);
            assert!(delay >= TimeDelta::seconds(90));
            assert!(delay <= TimeDelta::seconds(110));
        }
    }

    #[test]
    fn backoff_is_never_negative() {
        let strategy = BackoffStrategy::constant(TimeDelta::seconds(1))
            .with_jitter(Jitter::Absolute(TimeDelta::seconds(30)));
        for _ in 0..100 {
            assert!(strategy.backoff(1) >= TimeDelta::zero());
        }
    }

    #[test]
    fn pacing_samples_stay_within_bounds() {
        let pacing = PacingInterval::new(TimeDelta::seconds(2), TimeDelta::seconds(5));
        for _ in 0..100 {
            let delay = pacing.sample();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn degenerate_bounds_collapse_to_a_fixed_delay() {
        let pacing = PacingInterval::new(TimeDelta::seconds(3), TimeDelta::seconds(3));
        assert_eq!(pacing.sample(), Duration::from_secs(3));

        // An inverted range behaves as a fixed delay at the lower bound.
        let pacing = PacingInterval::new(TimeDelta::seconds(4), TimeDelta::seconds(1));
        assert_eq!(pacing.sample(), Duration::from_secs(4));
    }
}
