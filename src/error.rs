//! Error types for attempts and retry executions.

use std::fmt;
use std::time::Duration;

/// Why a single attempt failed.
///
/// Every variant is recoverable within an execution: it leads to another
/// attempt while budget remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The hard deadline elapsed and the request was cancelled.
    Aborted {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// The transport failed.
    Transport(E),
    /// The response arrived but its status is configured as retryable.
    RetryableStatus {
        /// The status code of the rejected response.
        status: u16,
    },
    /// The attempt task panicked or was shut down by the runtime.
    Interrupted {
        /// Description from the runtime.
        reason: String,
    },
}

impl<E> AttemptError<E> {
    /// Returns true if the attempt hit its hard deadline.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Returns true if the transport reported an error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The rejected status code, if this was a retryable status.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RetryableStatus { status } => Some(*status),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { timeout } => write!(f, "request aborted after {:?}", timeout),
            Self::Transport(e) => write!(f, "{}", e),
            Self::RetryableStatus { status } => write!(f, "bad response status {}", status),
            Self::Interrupted { reason } => write!(f, "attempt interrupted: {}", reason),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AttemptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Terminal error of a retry execution.
///
/// Carries the target URL and the failure of the last attempt that settled.
///
/// # Examples
///
/// ```rust
/// use undertow::{AttemptError, RetryError};
/// use std::time::Duration;
///
/// let err: RetryError<String> = RetryError::RetriesExhausted {
///     url: "http://example.com".to_string(),
///     attempts: 4,
///     elapsed: Duration::from_millis(3500),
///     last_error: AttemptError::RetryableStatus { status: 503 },
/// };
///
/// assert_eq!(err.url(), "http://example.com");
/// assert_eq!(err.attempts(), 4);
/// assert_eq!(err.last_error().status(), Some(503));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The sequential executor ran out of retries.
    RetriesExhausted {
        /// Target of the execution.
        url: String,
        /// Attempts made (initial + retries).
        attempts: u32,
        /// Time spent on the whole execution.
        elapsed: Duration,
        /// Failure of the final attempt.
        last_error: AttemptError<E>,
    },
    /// The racing executor could not get a successful response.
    AllAttemptsFailed {
        /// Target of the execution.
        url: String,
        /// Attempts launched.
        attempts: u32,
        /// Time spent on the whole execution.
        elapsed: Duration,
        /// Failure that ended the race.
        last_error: AttemptError<E>,
    },
}

impl<E> RetryError<E> {
    /// Target URL of the failed execution.
    pub fn url(&self) -> &str {
        match self {
            Self::RetriesExhausted { url, .. } | Self::AllAttemptsFailed { url, .. } => url,
        }
    }

    /// Number of attempts issued.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::AllAttemptsFailed { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Total time spent before giving up.
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::RetriesExhausted { elapsed, .. } | Self::AllAttemptsFailed { elapsed, .. } => {
                *elapsed
            }
        }
    }

    /// The underlying failure.
    pub fn last_error(&self) -> &AttemptError<E> {
        match self {
            Self::RetriesExhausted { last_error, .. }
            | Self::AllAttemptsFailed { last_error, .. } => last_error,
        }
    }

    /// Extract the underlying failure, discarding metadata.
    pub fn into_last_error(self) -> AttemptError<E> {
        match self {
            Self::RetriesExhausted { last_error, .. }
            | Self::AllAttemptsFailed { last_error, .. } => last_error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted {
                url,
                attempts,
                last_error,
                ..
            } => write!(
                f,
                "all retries failed after {} attempts. Url: {}: {}",
                attempts, url, last_error
            ),
            Self::AllAttemptsFailed {
                url,
                attempts,
                last_error,
                ..
            } => write!(
                f,
                "all raced attempts failed after {} attempts. Url: {}: {}",
                attempts, url, last_error
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.last_error())
    }
}
