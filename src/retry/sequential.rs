//! Sequential retries: one attempt at a time.

use tokio::time::Instant;

use crate::attempt::{run_attempt, Attempt};
use crate::config::{as_millis_u64, scale, RetryOptions};
use crate::error::RetryError;
use crate::state::RetryState;
use crate::transport::Transport;

/// Retry `url` until a response with an acceptable status arrives.
///
/// Each attempt runs to completion (response, transport error or hard
/// deadline) before the next one starts. The deadline of attempt `n` is
/// `timeout * growth_factor^n`. A response whose status is in the retryable
/// set counts as a failure. Every attempt's elapsed time is fed to the
/// dynamic timeout controller.
///
/// Fails with [`RetryError::RetriesExhausted`] after `retries + 1` failed
/// attempts.
pub async fn execute_sequential<T: Transport>(
    transport: &T,
    state: &RetryState,
    url: &str,
    options: &RetryOptions,
) -> Result<T::Response, RetryError<T::Error>> {
    let options = options.resolve(&state.snapshot());
    let start = Instant::now();
    let mut timeout = options.timeout;
    let mut number = 0u32;

    loop {
        let attempt = Attempt::new(number, timeout, timeout);
        match run_attempt(transport, state, url, &attempt, &options.status_codes).await {
            Ok(response) => return Ok(response),
            Err(_) if number < options.retries => {
                number += 1;
                timeout = scale(timeout, options.growth_factor);
                tracing::debug!(
                    url,
                    attempt = number,
                    timeout_ms = as_millis_u64(timeout),
                    "retrying"
                );
            }
            Err(error) => {
                tracing::warn!(url, attempts = number + 1, "all retries failed");
                return Err(RetryError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: number + 1,
                    elapsed: start.elapsed(),
                    last_error: error,
                });
            }
        }
    }
}
