//! Single attempts: a request under a hard deadline.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::as_millis_u64;
use crate::error::AttemptError;
use crate::state::RetryState;
use crate::transport::{HttpResponse, Transport};

/// One invocation of the transport within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Position within the execution, starting at 0.
    pub number: u32,
    /// After this long the racing executor stops waiting and starts another
    /// attempt, leaving this one running.
    pub soft_timeout: Duration,
    /// After this long the request is cancelled.
    pub hard_timeout: Duration,
    /// When the attempt was created.
    pub started_at: Instant,
}

impl Attempt {
    /// Create an attempt starting now.
    pub fn new(number: u32, soft_timeout: Duration, hard_timeout: Duration) -> Self {
        Self {
            number,
            soft_timeout,
            hard_timeout,
            started_at: Instant::now(),
        }
    }
}

/// Result of racing an attempt against its soft deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<R> {
    /// A response was obtained.
    Settled(R),
    /// The soft deadline passed first. The attempt keeps running in the
    /// background.
    Pending {
        /// Number of the attempt that was left running.
        attempt: u32,
    },
}

impl<R> AttemptOutcome<R> {
    /// Returns true if the soft deadline passed first.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// The response, if one was obtained.
    pub fn into_response(self) -> Option<R> {
        match self {
            Self::Settled(response) => Some(response),
            Self::Pending { .. } => None,
        }
    }
}

/// Perform one request, cancelling it if `timeout` elapses first.
///
/// The response is returned whatever its status.
///
/// # Examples
///
/// ```rust
/// use undertow::fetch_with_timeout;
/// use undertow::testing::MockTransport;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let transport = MockTransport::new().reply(Duration::from_millis(100), 200);
///
/// let result = fetch_with_timeout(&transport, "http://example.com", Duration::from_millis(10)).await;
/// assert!(result.unwrap_err().is_aborted());
/// # });
/// ```
pub async fn fetch_with_timeout<T: Transport>(
    transport: &T,
    url: &str,
    timeout: Duration,
) -> Result<T::Response, AttemptError<T::Error>> {
    match tokio::time::timeout(timeout, transport.send(url)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(AttemptError::Transport(e)),
        Err(_) => Err(AttemptError::Aborted { timeout }),
    }
}

/// Run `attempt` to a terminal outcome.
///
/// The elapsed time is fed to the controller whatever the outcome. A status
/// listed in `status_codes` turns the response into a failure.
pub(crate) async fn run_attempt<T: Transport>(
    transport: &T,
    state: &RetryState,
    url: &str,
    attempt: &Attempt,
    status_codes: &BTreeSet<u16>,
) -> Result<T::Response, AttemptError<T::Error>> {
    let result = fetch_with_timeout(transport, url, attempt.hard_timeout).await;
    state.record(attempt.started_at.elapsed());

    let result = match result {
        Ok(response) if status_codes.contains(&response.status()) => {
            Err(AttemptError::RetryableStatus {
                status: response.status(),
            })
        }
        other => other,
    };

    if let Err(ref error) = result {
        tracing::debug!(
            url,
            attempt = attempt.number,
            elapsed_ms = as_millis_u64(attempt.started_at.elapsed()),
            kind = error_kind(error),
            "attempt failed"
        );
    }
    result
}

fn error_kind<E>(error: &AttemptError<E>) -> &'static str {
    match error {
        AttemptError::Aborted { .. } => "aborted",
        AttemptError::Transport(_) => "transport",
        AttemptError::RetryableStatus { .. } => "status",
        AttemptError::Interrupted { .. } => "interrupted",
    }
}
