//! Shared, mutable retry state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{as_millis_u64, RetryConfig};
use crate::controller::{Adjustment, DynamicTimeout};

/// Handle to the live [`RetryConfig`] and the dynamic timeout statistics.
///
/// Clones share the same state, so every execution issued through clones of
/// one handle feeds the same controller and sees the same base timeout.
/// Create separate handles to keep clients from influencing each other.
///
/// The lock is only held for short synchronous sections and never across an
/// `.await`.
///
/// # Examples
///
/// ```rust
/// use undertow::{RetryConfig, RetryState};
/// use std::time::Duration;
///
/// let state = RetryState::new(
///     RetryConfig::default()
///         .with_timeout(Duration::from_millis(100))
///         .with_heuristic_threshold(1),
/// );
///
/// // One slow response is enough with a threshold of 1.
/// state.record(Duration::from_millis(90));
/// assert_eq!(state.timeout(), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    inner: Arc<Mutex<Shared>>,
}

#[derive(Debug, Default)]
struct Shared {
    config: RetryConfig,
    controller: DynamicTimeout,
}

impl RetryState {
    /// Create a state seeded with `config`.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared {
                config,
                controller: DynamicTimeout::default(),
            })),
        }
    }

    // Every critical section leaves the state consistent, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> RetryConfig {
        self.lock().config.clone()
    }

    /// Mutate the shared configuration in place.
    ///
    /// ```rust
    /// use undertow::RetryState;
    /// use std::time::Duration;
    ///
    /// let state = RetryState::default();
    /// state.update(|config| config.timeout = Duration::from_millis(50));
    /// assert_eq!(state.timeout(), Duration::from_millis(50));
    /// ```
    pub fn update<R>(&self, f: impl FnOnce(&mut RetryConfig) -> R) -> R {
        f(&mut self.lock().config)
    }

    /// Current base timeout.
    pub fn timeout(&self) -> Duration {
        self.lock().config.timeout
    }

    /// Current total timeout budget for raced executions.
    pub fn total_timeout(&self) -> Duration {
        self.lock().config.total_timeout
    }

    /// Mean of every response time recorded so far.
    pub fn average_response_time(&self) -> Option<Duration> {
        self.lock().controller.average()
    }

    /// Forget the recorded response times and the hysteresis counter.
    ///
    /// The configuration, including the adapted timeout, is kept.
    pub fn reset_statistics(&self) {
        self.lock().controller = DynamicTimeout::default();
    }

    /// Feed an observed response time to the dynamic timeout controller.
    ///
    /// Returns the adjustment made to the base timeout, if any.
    pub fn record(&self, response_time: Duration) -> Option<Adjustment> {
        let adjustment = {
            let mut guard = self.lock();
            let shared = &mut *guard;
            shared.controller.record(&mut shared.config, response_time)
        };

        match adjustment {
            Some(Adjustment::Expanded { from, to }) => tracing::info!(
                from_ms = as_millis_u64(from),
                to_ms = as_millis_u64(to),
                "expanded base timeout"
            ),
            Some(Adjustment::Contracted { from, to }) => tracing::info!(
                from_ms = as_millis_u64(from),
                to_ms = as_millis_u64(to),
                "contracted base timeout"
            ),
            None => {}
        }
        adjustment
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_clones_share_state() {
        let state = RetryState::new(RetryConfig::default().with_timeout(ms(100)));
        let other = state.clone();

        for _ in 0..3 {
            other.record(ms(90));
        }
        assert_eq!(state.timeout(), ms(200));
    }

    #[test]
    fn test_separate_states_are_isolated() {
        let a = RetryState::new(RetryConfig::default().with_timeout(ms(100)));
        let b = RetryState::new(RetryConfig::default().with_timeout(ms(100)));

        for _ in 0..3 {
            a.record(ms(90));
        }
        assert_eq!(a.timeout(), ms(200));
        assert_eq!(b.timeout(), ms(100));
    }

    #[test]
    fn test_update_returns_closure_value() {
        let state = RetryState::default();
        let previous = state.update(|config| std::mem::replace(&mut config.retries, 9));
        assert_eq!(previous, 4);
        assert_eq!(state.snapshot().retries, 9);
    }

    #[test]
    fn test_reset_statistics_keeps_timeout() {
        let state = RetryState::new(RetryConfig::default().with_timeout(ms(100)));
        for _ in 0..3 {
            state.record(ms(90));
        }
        assert_eq!(state.timeout(), ms(200));
        assert!(state.average_response_time().is_some());

        state.reset_statistics();
        assert_eq!(state.average_response_time(), None);
        assert_eq!(state.timeout(), ms(200));
    }

    #[test]
    fn test_total_timeout_tracks_adjustments() {
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(ms(100))
                .with_retries(1),
        );
        assert_eq!(state.total_timeout(), ms(300));

        for _ in 0..3 {
            state.record(ms(90));
        }
        assert_eq!(state.total_timeout(), ms(600));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_adjustment_is_logged() {
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(ms(100))
                .with_heuristic_threshold(1),
        );
        state.record(ms(90));
        assert!(logs_contain("expanded base timeout"));
    }
}
