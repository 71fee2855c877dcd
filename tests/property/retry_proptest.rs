//! Property-based tests for the retry policy

use chrono::Utc;
use proptest::prelude::*;
use std::time::Duration;
use surveysync::app::offline::{RetryDecision, RetryPolicy};

fn policy(max_attempts: u32, base_ms: u64, max_ms: u64, jitter: f64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(base_ms),
        max_delay: Duration::from_millis(max_ms),
        jitter,
    }
}

proptest! {
    #[test]
    fn test_delay_never_exceeds_jittered_cap(
        attempts in 0u32..64,
        base_ms in 1u64..10_000,
        max_ms in 1u64..600_000,
        jitter in 0.0f64..=1.0,
    ) {
        let policy = policy(8, base_ms, max_ms, jitter);
        let delay = policy.delay_for(attempts);
        let cap = Duration::from_millis(max_ms).mul_f64(1.0 + jitter);
        prop_assert!(delay <= cap + Duration::from_millis(1));
    }

    #[test]
    fn test_unjittered_delay_is_monotonic(
        attempts in 1u32..40,
        base_ms in 1u64..10_000,
        max_ms in 1u64..600_000,
    ) {
        let policy = policy(8, base_ms, max_ms, 0.0);
        prop_assert!(policy.delay_for(attempts) <= policy.delay_for(attempts + 1));
    }

    #[test]
    fn test_parks_exactly_at_max_attempts(max_attempts in 1u32..20, attempts in 0u32..40) {
        let now = Utc::now();
        let decision = policy(max_attempts, 100, 1_000, 0.0).decide(attempts, now);
        if attempts >= max_attempts {
            prop_assert_eq!(decision, RetryDecision::Park);
        } else {
            prop_assert!(matches!(decision, RetryDecision::RetryAt(at) if at >= now));
        }
    }
}
