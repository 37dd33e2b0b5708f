//! Property-based tests for the dynamic timeout controller

use proptest::prelude::*;
use std::time::Duration;
use undertow::{total_timeout, Adjustment, RetryConfig, RetryState};

fn samples() -> impl Strategy<Value = Vec<Duration>> {
    prop::collection::vec((0u64..5_000).prop_map(Duration::from_millis), 0..200)
}

proptest! {
    #[test]
    fn prop_disabled_controller_never_changes_config(
        timeout_ms in 1u64..2_000,
        samples in samples(),
    ) {
        let config = RetryConfig::default()
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_dynamic_timeout(false);
        let state = RetryState::new(config.clone());

        for sample in samples {
            prop_assert_eq!(state.record(sample), None);
        }

        prop_assert_eq!(state.snapshot(), config);
        prop_assert_eq!(state.average_response_time(), None);
    }

    #[test]
    fn prop_timeout_stays_within_bounds(
        min_ms in 1u64..200,
        span_ms in 0u64..2_000,
        samples in samples(),
    ) {
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(min_ms + span_ms);
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(min)
                .with_timeout_bounds(min, max),
        );

        for sample in samples {
            state.record(sample);
            let timeout = state.timeout();
            prop_assert!(timeout >= min && timeout <= max, "{:?} not in {:?}..={:?}", timeout, min, max);
        }
    }

    #[test]
    fn prop_no_adjustment_before_threshold(
        threshold in 2u32..10,
        samples in samples(),
    ) {
        let state = RetryState::new(RetryConfig::default().with_heuristic_threshold(threshold));
        let initial = state.timeout();

        for sample in samples.into_iter().take(threshold as usize - 1) {
            prop_assert_eq!(state.record(sample), None);
        }

        prop_assert_eq!(state.timeout(), initial);
    }

    #[test]
    fn prop_total_timeout_follows_adapted_timeout(samples in samples()) {
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(Duration::from_millis(100))
                .with_retries(2)
                .with_heuristic_threshold(1),
        );

        for sample in samples {
            state.record(sample);
            let config = state.snapshot();
            prop_assert_eq!(
                config.total_timeout,
                total_timeout(config.timeout, config.growth_factor, config.retries)
            );
        }
    }

    #[test]
    fn prop_adjustment_reports_new_timeout(samples in samples()) {
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(Duration::from_millis(200))
                .with_heuristic_threshold(1),
        );

        for sample in samples {
            let before = state.timeout();
            match state.record(sample) {
                Some(adjustment @ Adjustment::Expanded { from, to }) => {
                    prop_assert_eq!(from, before);
                    prop_assert!(to >= from);
                    prop_assert_eq!(adjustment.new_timeout(), state.timeout());
                }
                Some(adjustment @ Adjustment::Contracted { from, to }) => {
                    prop_assert_eq!(from, before);
                    prop_assert!(to <= from);
                    prop_assert_eq!(adjustment.new_timeout(), state.timeout());
                }
                None => prop_assert_eq!(state.timeout(), before),
            }
        }
    }
}
