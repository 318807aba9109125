//! Per-step retry policy: attempt budget, backoff and classification.

use crate::errors::StepError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No delay between attempts.
    Immediate,
    /// delay = base (constant)
    Fixed,
    /// delay = base * (retries so far)
    Linear,
    /// delay = base * 2^(retries so far - 1)
    #[default]
    Exponential,
}

/// Jitter applied on top of the computed backoff delay.
///
/// Defaults to `None` so the exponential policy's delays are
/// monotonically non-decreasing; enable jitter on wide fan-outs where
/// synchronized retries would hammer the same upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

/// How many times a step may run and how long to wait between attempts.
///
/// "Is this worth retrying" ([`RetryPolicy::should_retry`]) is separate
/// from "how long to wait" ([`RetryPolicy::delay_before`]) so both are
/// unit-testable without real time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first (always >= 1).
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that retries immediately with no delay.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            backoff: BackoffStrategy::Immediate,
            ..Self::default()
        }
    }

    /// A policy with a fixed delay between attempts.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff: BackoffStrategy::Fixed,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Sets the maximum attempts (clamped to at least 1).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Decides whether a failed step should run again.
    ///
    /// `attempts` is the number of attempts already made. Fatal errors
    /// short-circuit regardless of the remaining attempt budget.
    #[must_use]
    pub fn should_retry(&self, attempts: u32, error: &StepError) -> bool {
        !error.is_fatal() && attempts < self.max_attempts
    }

    /// Returns the delay to wait before the given attempt number.
    ///
    /// Attempt numbers are 1-based; the first attempt never waits.
    /// Without jitter the result is monotonically non-decreasing in the
    /// attempt number for every strategy.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let retries = u64::from(attempt - 1);

        let raw = match self.backoff {
            BackoffStrategy::Immediate => 0,
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(retries),
            BackoffStrategy::Exponential => {
                let shift = u32::try_from(retries - 1).unwrap_or(u32::MAX);
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(shift))
            }
        };
        let capped = raw.min(self.max_delay_ms);

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => {
                if capped == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=capped)
                }
            }
            JitterStrategy::Equal => {
                let half = capped / 2;
                if half == 0 {
                    capped
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_should_retry_respects_budget() {
        let policy = RetryPolicy::new().with_max_attempts(3);
        let err = StepError::transient("timeout");

        assert!(policy.should_retry(1, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
    }

    #[test]
    fn test_fatal_short_circuits() {
        let policy = RetryPolicy::new().with_max_attempts(10);
        let err = StepError::fatal("schema violation");

        assert!(!policy.should_retry(1, &err));
    }

    #[test]
    fn test_first_attempt_never_waits() {
        let policy = RetryPolicy::new().with_base_delay_ms(500);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn test_immediate_delay_is_zero() {
        let policy = RetryPolicy::immediate(5);
        for attempt in 1..=5 {
            assert_eq!(policy.delay_before(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(4, Duration::from_millis(250));
        assert_eq!(policy.delay_before(2), Duration::from_millis(250));
        assert_eq!(policy.delay_before(4), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Exponential);

        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_delay_grows() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear);

        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_is_monotonic_without_jitter() {
        for backoff in [
            BackoffStrategy::Immediate,
            BackoffStrategy::Fixed,
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
        ] {
            let policy = RetryPolicy::new()
                .with_base_delay_ms(50)
                .with_backoff(backoff);
            let mut prev = Duration::ZERO;
            for attempt in 1..=12 {
                let delay = policy.delay_before(attempt);
                assert!(delay >= prev, "{backoff:?} regressed at attempt {attempt}");
                prev = delay;
            }
        }
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000);

        assert_eq!(policy.delay_before(12), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_bounded_by_delay() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Fixed)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..20 {
            assert!(policy.delay_before(2) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_policy_serialization() {
        let policy = RetryPolicy::fixed(2, Duration::from_secs(300));
        let json = serde_json::to_string(&policy).unwrap();
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
