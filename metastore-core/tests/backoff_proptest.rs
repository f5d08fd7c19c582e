//! Property-based tests for the reconnect backoff schedule

use metastore_core::Backoff;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #[test]
    fn test_delays_follow_capped_exponent(
        interval_ms in 1u64..10_000,
        max_exp_counter in 0u32..=20,
        attempts in 1usize..64,
    ) {
        let interval = Duration::from_millis(interval_ms);
        let mut backoff = Backoff::new(interval, max_exp_counter);

        for n in 0..attempts {
            let exp = (n as u32).min(max_exp_counter);
            let expected = interval * 2u32.pow(exp);
            prop_assert_eq!(backoff.next_delay(), expected);
        }
        prop_assert_eq!(backoff.attempts() as usize, attempts);
    }

    #[test]
    fn test_delays_never_decrease_until_reset(
        interval_ms in 1u64..10_000,
        max_exp_counter in 0u32..=20,
        attempts in 2usize..64,
    ) {
        let mut backoff = Backoff::new(Duration::from_millis(interval_ms), max_exp_counter);
        let mut previous = backoff.next_delay();
        for _ in 1..attempts {
            let next = backoff.next_delay();
            prop_assert!(next >= previous);
            previous = next;
        }

        backoff.reset();
        prop_assert_eq!(backoff.next_delay(), Duration::from_millis(interval_ms));
    }
}
