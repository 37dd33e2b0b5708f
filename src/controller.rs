//! Dynamic timeout controller.
//!
//! Tracks the mean observed response time and nudges the shared base timeout
//! up or down. Adjustments are debounced by a signed counter: each sample
//! above the band adds one, each sample below it subtracts one, and the
//! timeout only moves once the counter reaches `±heuristic_threshold`.
//!
//! ```text
//!   0        0.25×timeout            0.6×timeout
//!   |-----------|-----------------------|------------->  mean response time
//!     contract        dead zone             expand
//! ```
//!
//! The controller is pure: it mutates the [`RetryConfig`] it is handed and
//! reports what it did. Locking and logging live in [`RetryState`](crate::RetryState).

use std::time::Duration;

use crate::config::{scale, RetryConfig};

/// Mean above this fraction of the timeout signals "too tight".
const EXPAND_RATIO: f64 = 0.6;
/// Mean below this fraction of the timeout signals "too loose".
const CONTRACT_RATIO: f64 = 0.25;
/// Samples beyond this multiple of the timeout count as the timeout itself.
const OUTLIER_MULTIPLE: u32 = 3;

/// A change made to the base timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// The timeout grew.
    Expanded {
        /// Timeout before the change.
        from: Duration,
        /// Timeout after the change.
        to: Duration,
    },
    /// The timeout shrank.
    Contracted {
        /// Timeout before the change.
        from: Duration,
        /// Timeout after the change.
        to: Duration,
    },
}

impl Adjustment {
    /// The timeout after the change.
    pub fn new_timeout(&self) -> Duration {
        match self {
            Self::Expanded { to, .. } | Self::Contracted { to, .. } => *to,
        }
    }
}

/// Running latency statistics and the hysteresis counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DynamicTimeout {
    sample_count: u64,
    sample_sum: Duration,
    signal: i64,
}

impl DynamicTimeout {
    /// Mean of all recorded samples, if any.
    pub(crate) fn average(&self) -> Option<Duration> {
        if self.sample_count == 0 {
            return None;
        }
        let nanos = self.sample_sum.as_nanos() / u128::from(self.sample_count);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    #[cfg(test)]
    pub(crate) fn signal(&self) -> i64 {
        self.signal
    }

    /// Feed one observed response time.
    pub(crate) fn record(
        &mut self,
        config: &mut RetryConfig,
        response_time: Duration,
    ) -> Option<Adjustment> {
        if !config.dynamic_timeout {
            return None;
        }

        let sample = if response_time > config.timeout.saturating_mul(OUTLIER_MULTIPLE) {
            config.timeout
        } else {
            response_time
        };
        self.sample_sum = self.sample_sum.saturating_add(sample);
        self.sample_count += 1;

        let average = self.sample_sum.as_secs_f64() / self.sample_count as f64;
        let timeout = config.timeout.as_secs_f64();
        let threshold = i64::from(config.heuristic_threshold);

        if average > timeout * EXPAND_RATIO {
            self.signal += 1;
            if self.signal >= threshold {
                self.signal = 0;
                return Some(expand(config));
            }
        } else if average < timeout * CONTRACT_RATIO {
            self.signal -= 1;
            if self.signal <= -threshold {
                self.signal = 0;
                return Some(contract(config));
            }
        }
        None
    }
}

fn expand(config: &mut RetryConfig) -> Adjustment {
    let from = config.timeout;
    config.timeout = scale(from, config.growth_factor).min(config.max_timeout);
    config.recompute_total_timeout();
    Adjustment::Expanded {
        from,
        to: config.timeout,
    }
}

fn contract(config: &mut RetryConfig) -> Adjustment {
    let from = config.timeout;
    config.timeout = scale(from, config.growth_factor.recip()).max(config.min_timeout);
    config.recompute_total_timeout();
    Adjustment::Contracted {
        from,
        to: config.timeout,
    }
}

#[cfg(test)]
mod controller_tests {
    use super::*;

    fn config(timeout_ms: u64) -> RetryConfig {
        RetryConfig::default().with_timeout(Duration::from_millis(timeout_ms))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_disabled_controller_is_inert() {
        let mut cfg = config(100).with_dynamic_timeout(false);
        let mut ctl = DynamicTimeout::default();

        for _ in 0..20 {
            assert_eq!(ctl.record(&mut cfg, ms(1000)), None);
        }
        assert_eq!(cfg.timeout, ms(100));
        assert_eq!(ctl.average(), None);
    }

    #[test]
    fn test_expands_after_threshold_samples() {
        let mut cfg = config(100);
        let mut ctl = DynamicTimeout::default();

        assert_eq!(ctl.record(&mut cfg, ms(90)), None);
        assert_eq!(ctl.record(&mut cfg, ms(90)), None);
        assert_eq!(
            ctl.record(&mut cfg, ms(90)),
            Some(Adjustment::Expanded {
                from: ms(100),
                to: ms(200)
            })
        );
        assert_eq!(cfg.timeout, ms(200));
        assert_eq!(ctl.signal(), 0);
    }

    #[test]
    fn test_expansion_recomputes_total_timeout() {
        let mut cfg = config(100).with_retries(2);
        let mut ctl = DynamicTimeout::default();

        for _ in 0..3 {
            ctl.record(&mut cfg, ms(90));
        }
        // 200 -> 600 -> 1800
        assert_eq!(cfg.total_timeout, ms(1800));
    }

    #[test]
    fn test_contracts_after_threshold_samples() {
        let mut cfg = config(1000);
        let mut ctl = DynamicTimeout::default();

        assert_eq!(ctl.record(&mut cfg, ms(10)), None);
        assert_eq!(ctl.record(&mut cfg, ms(10)), None);
        assert_eq!(ctl.signal(), -2);
        assert_eq!(
            ctl.record(&mut cfg, ms(10)),
            Some(Adjustment::Contracted {
                from: ms(1000),
                to: ms(500)
            })
        );
        assert_eq!(cfg.timeout, ms(500));
    }

    #[test]
    fn test_contraction_replaces_rather_than_compounds() {
        let mut cfg = config(1600);
        let mut ctl = DynamicTimeout::default();

        for _ in 0..3 {
            ctl.record(&mut cfg, ms(1));
        }
        assert_eq!(cfg.timeout, ms(800));
    }

    #[test]
    fn test_dead_zone_leaves_signal_unchanged() {
        let mut cfg = config(100);
        let mut ctl = DynamicTimeout::default();

        ctl.record(&mut cfg, ms(70));
        assert_eq!(ctl.signal(), 1);

        // Pull the mean into the band between 25ms and 60ms.
        for _ in 0..10 {
            ctl.record(&mut cfg, ms(40));
        }
        assert_eq!(ctl.signal(), 1);
        assert_eq!(cfg.timeout, ms(100));
    }

    #[test]
    fn test_outlier_counts_as_timeout() {
        let mut cfg = config(100);
        let mut ctl = DynamicTimeout::default();

        ctl.record(&mut cfg, ms(10_000));
        assert_eq!(ctl.average(), Some(ms(100)));

        // Exactly three times the timeout is not an outlier.
        let mut ctl = DynamicTimeout::default();
        ctl.record(&mut cfg, ms(300));
        assert_eq!(ctl.average(), Some(ms(300)));
    }

    #[test]
    fn test_expansion_clamped_to_max() {
        let mut cfg = config(100).with_timeout_bounds(Duration::ZERO, ms(150));
        let mut ctl = DynamicTimeout::default();

        for _ in 0..3 {
            ctl.record(&mut cfg, ms(90));
        }
        assert_eq!(cfg.timeout, ms(150));
    }

    #[test]
    fn test_contraction_clamped_to_min() {
        let mut cfg = config(1000).with_timeout_bounds(ms(700), ms(10_000));
        let mut ctl = DynamicTimeout::default();

        for _ in 0..9 {
            ctl.record(&mut cfg, ms(1));
        }
        assert_eq!(cfg.timeout, ms(700));
    }

    #[test]
    fn test_cumulative_mean_is_not_windowed() {
        let mut cfg = config(1000).with_dynamic_timeout(true);
        let mut ctl = DynamicTimeout::default();

        ctl.record(&mut cfg, ms(900));
        ctl.record(&mut cfg, ms(100));
        assert_eq!(ctl.average(), Some(ms(500)));
    }
}
