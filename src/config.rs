//! Retry configuration and per-call overrides.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Number of retries after the initial attempt.
pub const DEFAULT_RETRIES: u32 = 4;
/// Base timeout of the first attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Factor the timeout is multiplied by after each attempt.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;
/// Response codes that are retried even though the request itself succeeded.
pub const DEFAULT_STATUS_CODES: [u16; 9] = [408, 500, 502, 503, 504, 506, 507, 508, 510];
/// Whether the base timeout follows the observed response times.
pub const DEFAULT_DYNAMIC_TIMEOUT: bool = true;
/// Upper clamp for the adapted timeout. Effectively unbounded.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_millis(u64::MAX);
/// Lower clamp for the adapted timeout.
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::ZERO;
/// Consecutive same-direction signals required before the timeout moves.
pub const DEFAULT_HEURISTIC_THRESHOLD: u32 = 3;

/// Shared retry configuration.
///
/// A `RetryConfig` is plain data. The live, mutable copy is owned by a
/// [`RetryState`](crate::RetryState), which the dynamic timeout controller
/// updates as responses come in.
///
/// # Examples
///
/// ```rust
/// use undertow::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default()
///     .with_timeout(Duration::from_millis(200))
///     .with_retries(3);
///
/// // 200 -> 600 -> 1800 -> 5400
/// assert_eq!(config.total_timeout, Duration::from_millis(5400));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryConfig {
    /// Retries allowed after the initial attempt.
    pub retries: u32,
    /// Current base timeout.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub timeout: Duration,
    /// Multiplier applied to the timeout for each successive attempt.
    pub growth_factor: f64,
    /// Status codes treated as retryable failures.
    pub status_codes: BTreeSet<u16>,
    /// Master switch for the dynamic timeout controller.
    pub dynamic_timeout: bool,
    /// Upper clamp for the adapted timeout.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub max_timeout: Duration,
    /// Lower clamp for the adapted timeout.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub min_timeout: Duration,
    /// Consecutive signals needed before the timeout is adjusted.
    pub heuristic_threshold: u32,
    /// Hard-deadline budget for one raced execution.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub total_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            status_codes: DEFAULT_STATUS_CODES.into_iter().collect(),
            dynamic_timeout: DEFAULT_DYNAMIC_TIMEOUT,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            min_timeout: DEFAULT_MIN_TIMEOUT,
            heuristic_threshold: DEFAULT_HEURISTIC_THRESHOLD,
            total_timeout: total_timeout(DEFAULT_TIMEOUT, DEFAULT_GROWTH_FACTOR, DEFAULT_RETRIES),
        }
    }
}

impl RetryConfig {
    /// Set the retry budget and recompute the total timeout.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self.recompute_total_timeout();
        self
    }

    /// Set the base timeout and recompute the total timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.recompute_total_timeout();
        self
    }

    /// Set the growth factor and recompute the total timeout.
    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self.recompute_total_timeout();
        self
    }

    /// Replace the set of retryable status codes.
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = codes.into_iter().collect();
        self
    }

    /// Enable or disable the dynamic timeout controller.
    pub fn with_dynamic_timeout(mut self, enabled: bool) -> Self {
        self.dynamic_timeout = enabled;
        self
    }

    /// Set the clamps for the adapted timeout.
    pub fn with_timeout_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_timeout = min;
        self.max_timeout = max;
        self
    }

    /// Set how many consecutive signals trigger an adjustment.
    pub fn with_heuristic_threshold(mut self, threshold: u32) -> Self {
        self.heuristic_threshold = threshold;
        self
    }

    /// Set the total timeout explicitly.
    ///
    /// The value is replaced by the derived one the next time the timeout,
    /// growth factor or retry budget changes.
    pub fn with_total_timeout(mut self, total: Duration) -> Self {
        self.total_timeout = total;
        self
    }

    /// Whether `status` is one of the retryable status codes.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    pub(crate) fn recompute_total_timeout(&mut self) {
        self.total_timeout = total_timeout(self.timeout, self.growth_factor, self.retries);
    }

    /// Check that the configuration is well formed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use undertow::{ConfigError, RetryConfig};
    ///
    /// let config = RetryConfig::default().with_growth_factor(1.0);
    /// assert_eq!(config.validate(), Err(ConfigError::GrowthFactor(1.0)));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(self.growth_factor > 1.0 && self.growth_factor.is_finite()) {
            return Err(ConfigError::GrowthFactor(self.growth_factor));
        }
        if self.heuristic_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.min_timeout > self.max_timeout {
            return Err(ConfigError::InvertedBounds {
                min: self.min_timeout,
                max: self.max_timeout,
            });
        }
        if self.total_timeout < self.timeout {
            return Err(ConfigError::TotalBelowTimeout {
                total: self.total_timeout,
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

/// Error returned by [`RetryConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The base timeout is zero.
    ZeroTimeout,
    /// The growth factor is not a finite number greater than one.
    GrowthFactor(f64),
    /// The heuristic threshold is zero.
    ZeroThreshold,
    /// The minimum timeout exceeds the maximum.
    InvertedBounds {
        /// Configured minimum.
        min: Duration,
        /// Configured maximum.
        max: Duration,
    },
    /// The total timeout is smaller than a single attempt's timeout.
    TotalBelowTimeout {
        /// Configured total timeout.
        total: Duration,
        /// Configured base timeout.
        timeout: Duration,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTimeout => write!(f, "timeout must be greater than zero"),
            Self::GrowthFactor(g) => write!(f, "growth factor must be greater than 1, got {}", g),
            Self::ZeroThreshold => write!(f, "heuristic threshold must be greater than zero"),
            Self::InvertedBounds { min, max } => {
                write!(f, "min timeout {:?} exceeds max timeout {:?}", min, max)
            }
            Self::TotalBelowTimeout { total, timeout } => write!(
                f,
                "total timeout {:?} is smaller than timeout {:?}",
                total, timeout
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-call overrides of the shared configuration.
///
/// Unset fields fall back to the shared [`RetryConfig`]. Overrides never
/// write back to the shared state.
///
/// # Examples
///
/// ```rust
/// use undertow::{RetryConfig, RetryOptions};
/// use std::time::Duration;
///
/// let shared = RetryConfig::default();
/// let options = RetryOptions::new()
///     .retries(3)
///     .timeout(Duration::from_millis(200));
///
/// let resolved = options.resolve(&shared);
/// assert_eq!(resolved.retries, 3);
/// assert_eq!(resolved.growth_factor, shared.growth_factor);
/// // Derived from the overridden values, not the shared total.
/// assert_eq!(resolved.total_timeout, Duration::from_millis(5400));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryOptions {
    /// Retry budget override.
    pub retries: Option<u32>,
    /// Base timeout override.
    pub timeout: Option<Duration>,
    /// Growth factor override.
    pub growth_factor: Option<f64>,
    /// Retryable status codes override.
    pub status_codes: Option<BTreeSet<u16>>,
    /// Total timeout override (raced executions only).
    pub total_timeout: Option<Duration>,
}

impl RetryOptions {
    /// Options that defer entirely to the shared configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retry budget.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Override the base timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the growth factor.
    pub fn growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = Some(growth_factor);
        self
    }

    /// Override the retryable status codes.
    pub fn status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Override the total timeout budget.
    pub fn total_timeout(mut self, total: Duration) -> Self {
        self.total_timeout = Some(total);
        self
    }

    /// Merge these overrides onto a snapshot of the shared configuration.
    ///
    /// Without an explicit `total_timeout`, the budget is the shared one
    /// unless the timeout, growth factor or retries were overridden, in
    /// which case it is derived from the effective values.
    pub fn resolve(&self, shared: &RetryConfig) -> ResolvedOptions {
        let retries = self.retries.unwrap_or(shared.retries);
        let timeout = self.timeout.unwrap_or(shared.timeout);
        let growth_factor = self.growth_factor.unwrap_or(shared.growth_factor);
        let derived = self.retries.is_some() || self.timeout.is_some() || self.growth_factor.is_some();
        let total_timeout = match self.total_timeout {
            Some(total) => total,
            None if derived => total_timeout(timeout, growth_factor, retries),
            None => shared.total_timeout,
        };

        ResolvedOptions {
            retries,
            timeout,
            growth_factor,
            status_codes: self
                .status_codes
                .clone()
                .unwrap_or_else(|| shared.status_codes.clone()),
            total_timeout,
        }
    }
}

/// The effective settings of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    /// Retries allowed after the initial attempt.
    pub retries: u32,
    /// Timeout of the first attempt.
    pub timeout: Duration,
    /// Multiplier between consecutive attempt timeouts.
    pub growth_factor: f64,
    /// Status codes treated as failures.
    pub status_codes: BTreeSet<u16>,
    /// Hard-deadline budget for a raced execution.
    pub total_timeout: Duration,
}

impl ResolvedOptions {
    /// Timeout of attempt `n` (0-indexed): `timeout * growth_factor^n`.
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        (0..attempt).fold(self.timeout, |t, _| scale(t, self.growth_factor))
    }
}

/// Total time budget of a raced execution.
///
/// Each retry adds `growth_factor` times the running total, giving
/// `timeout * (1 + growth_factor)^retries`.
///
/// # Examples
///
/// ```rust
/// use undertow::total_timeout;
/// use std::time::Duration;
///
/// // 500 -> 1500 -> 4500 -> 13500 -> 40500
/// assert_eq!(
///     total_timeout(Duration::from_millis(500), 2.0, 4),
///     Duration::from_millis(40500)
/// );
/// ```
pub fn total_timeout(timeout: Duration, growth_factor: f64, retries: u32) -> Duration {
    (0..retries).fold(timeout, |total, _| {
        total.saturating_add(scale(total, growth_factor))
    })
}

/// Multiply a duration by a factor, saturating instead of panicking.
pub(crate) fn scale(duration: Duration, factor: f64) -> Duration {
    let nanos = duration.as_nanos() as f64 * factor;
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos.round() as u64)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::as_millis_u64(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
