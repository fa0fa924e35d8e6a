//! Retry backoff.
//!
//! `delay(attempt) = min(base * 2^attempt, cap) + jitter`, with the jitter
//! drawn by the caller and reduced into `0..=jitter_ms`. All integer
//! milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff with additive uniform jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay of the first retry, before jitter.
    pub base_delay_ms: u64,
    /// Cap of the exponential part.
    pub max_delay_ms: u64,
    /// Upper bound (inclusive) of the jitter.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_ms: 250,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_ms,
        }
    }

    /// Exponential part for zero-based `attempt`, capped.
    #[must_use]
    pub fn exponential_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Delay with a caller-chosen jitter sample, reduced into `0..=jitter_ms`.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter_sample: u64) -> Duration {
        let jitter = jitter_sample % self.jitter_ms.saturating_add(1);
        Duration::from_millis(self.exponential_ms(attempt).saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy = BackoffPolicy::new(1_000, 60_000, 0);
        assert_eq!(policy.exponential_ms(0), 1_000);
        assert_eq!(policy.exponential_ms(1), 2_000);
        assert_eq!(policy.exponential_ms(5), 32_000);
        assert_eq!(policy.exponential_ms(6), 60_000);
        assert_eq!(policy.exponential_ms(200), 60_000);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = BackoffPolicy::new(100, 1_000, 50);
        assert_eq!(policy.delay_with_jitter(0, 0), Duration::from_millis(100));
        assert_eq!(policy.delay_with_jitter(0, 50), Duration::from_millis(150));
        assert_eq!(policy.delay_with_jitter(0, 51), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_jitter() {
        let policy = BackoffPolicy::new(10, 100, 0);
        assert_eq!(policy.delay_with_jitter(1, 12_345), Duration::from_millis(20));
        assert_eq!(policy.delay_with_jitter(1, u64::MAX), Duration::from_millis(20));
    }
}
