//! Property-based tests for backoff and retry decisions.

use std::time::Duration;

use proptest::prelude::*;

use super::backoff::BackoffPolicy;
use super::classify::{DeliveryFailure, FailureClass, RetryDecision, classify_status, decide};

fn arb_policy() -> impl Strategy<Value = BackoffPolicy> {
    (1u64..10_000, 0u64..1_000).prop_flat_map(|(base, jitter)| {
        (base..=base * 100).prop_map(move |cap| BackoffPolicy::new(base, cap, jitter))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The delay never exceeds cap + jitter and never drops below base.
    #[test]
    fn prop_delay_bounded(policy in arb_policy(), attempt in 0u32..100, sample in any::<u64>()) {
        let delay = policy.delay_with_jitter(attempt, sample);
        prop_assert!(delay >= Duration::from_millis(policy.base_delay_ms));
        prop_assert!(delay <= Duration::from_millis(policy.max_delay_ms + policy.jitter_ms));
    }

    /// Without jitter the delay is non-decreasing in the attempt number.
    #[test]
    fn prop_delay_monotonic(policy in arb_policy(), attempt in 0u32..100) {
        prop_assert!(policy.exponential_ms(attempt) <= policy.exponential_ms(attempt + 1));
    }

    /// Every non-2xx status other than 429 and 5xx is permanent.
    #[test]
    fn prop_status_classification(status in 300u16..600) {
        let expected = if status == 429 || status >= 500 {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        };
        prop_assert_eq!(classify_status(status), expected);
    }

    /// A transient failure is retried exactly `max_attempts - 1` times.
    #[test]
    fn prop_transient_attempt_budget(max_attempts in 1u32..20, policy in arb_policy()) {
        let failure = DeliveryFailure::Timeout;
        let retries = (1..=max_attempts)
            .take_while(|&made| matches!(decide(&failure, made, max_attempts, &policy, 0), RetryDecision::Retry { .. }))
            .count();
        prop_assert_eq!(retries, (max_attempts - 1) as usize);
    }
}
