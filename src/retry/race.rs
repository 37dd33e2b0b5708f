//! Raced retries: overlapping attempts.
//!
//! When an attempt outlives its soft deadline it is not cancelled. It keeps
//! running as an independent task while the next attempt starts, and every
//! attempt still in flight takes part in the race for the first outcome.
//!
//! ```text
//! t ──────────────────────────────────────────────────────────▶
//! #0 [soft 200]────────┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄ hard = total
//! #1                   [soft 400]──────────┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄┄ hard = total - 200
//! #2                                       [soft 800]─────────── hard = total - 600
//! ```
//!
//! All attempts of one execution share a single hard-deadline budget, so
//! none of them outlives `total_timeout` measured from the first launch.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::attempt::{run_attempt, Attempt, AttemptOutcome};
use crate::config::{as_millis_u64, scale, RetryOptions};
use crate::error::{AttemptError, RetryError};
use crate::state::RetryState;
use crate::transport::Transport;

type AttemptResult<R, E> = Result<R, AttemptError<E>>;

/// Everything a spawned attempt needs, shared by all attempts of one execution.
struct AttemptContext<T> {
    transport: Arc<T>,
    state: RetryState,
    url: String,
    status_codes: BTreeSet<u16>,
}

/// Attempts that passed their soft deadline and are still running.
///
/// Dropping the set detaches the tasks: they run until their own hard
/// deadline and keep feeding the controller.
pub(crate) struct ActiveAttempts<R, E> {
    tasks: FuturesUnordered<JoinHandle<AttemptResult<R, E>>>,
}

impl<R, E> ActiveAttempts<R, E> {
    pub(crate) fn new() -> Self {
        Self {
            tasks: FuturesUnordered::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn push(&mut self, task: JoinHandle<AttemptResult<R, E>>) {
        self.tasks.push(task);
    }

    /// Wait for the next attempt to reach a terminal outcome.
    async fn next_settled(&mut self) -> Option<AttemptResult<R, E>> {
        self.tasks.next().await.map(flatten)
    }

    /// Wait for the first success, skipping failures.
    ///
    /// Fails with the last failure once every attempt has failed, or with
    /// `None` if there was nothing to wait for.
    async fn first_success(&mut self) -> Result<R, Option<AttemptError<E>>> {
        let mut last_error = None;
        while let Some(result) = self.next_settled().await {
            match result {
                Ok(response) => return Ok(response),
                Err(error) => last_error = Some(error),
            }
        }
        Err(last_error)
    }
}

fn flatten<R, E>(joined: Result<AttemptResult<R, E>, JoinError>) -> AttemptResult<R, E> {
    joined.unwrap_or_else(|e| {
        Err(AttemptError::Interrupted {
            reason: e.to_string(),
        })
    })
}

fn spawn_attempt<T: Transport>(
    ctx: &Arc<AttemptContext<T>>,
    attempt: Attempt,
) -> JoinHandle<AttemptResult<T::Response, T::Error>> {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        run_attempt(
            ctx.transport.as_ref(),
            &ctx.state,
            &ctx.url,
            &attempt,
            &ctx.status_codes,
        )
        .await
    })
}

/// Launch `attempt` and race it against its soft deadline and `active`.
///
/// - The new attempt settles first: its response, or its failure.
/// - A previously active attempt settles first: likewise.
/// - The soft deadline passes first: the attempt joins `active` and
///   [`AttemptOutcome::Pending`] is returned.
///
/// An attempt settling at the same instant as the soft deadline counts as
/// settled.
async fn race_one_attempt<T: Transport>(
    ctx: &Arc<AttemptContext<T>>,
    attempt: Attempt,
    active: &mut ActiveAttempts<T::Response, T::Error>,
) -> AttemptResult<AttemptOutcome<T::Response>, T::Error> {
    let number = attempt.number;
    let mut task = spawn_attempt(ctx, attempt);
    let soft_deadline = tokio::time::sleep(attempt.soft_timeout);
    tokio::pin!(soft_deadline);

    tokio::select! {
        biased;

        joined = &mut task => flatten(joined).map(AttemptOutcome::Settled),
        Some(settled) = active.next_settled(), if !active.is_empty() => {
            settled.map(AttemptOutcome::Settled)
        }
        _ = &mut soft_deadline => {
            active.push(task);
            Ok(AttemptOutcome::Pending { attempt: number })
        }
    }
}

/// Retry `url` with overlapping attempts.
///
/// Attempt `n` gets a soft deadline of `timeout * growth_factor^n`. When it
/// passes, the attempt keeps running and attempt `n + 1` starts. The hard
/// deadline of each attempt is whatever is left of `total_timeout` when it
/// starts. The first success among all running attempts wins.
///
/// Any attempt failing while attempts are still being launched ends the
/// execution with that failure. Once the retry budget is spent, the
/// remaining attempts are waited on and the first success wins; the
/// execution only fails if all of them fail.
///
/// Failures are reported as [`RetryError::AllAttemptsFailed`].
pub async fn execute_raced<T: Transport>(
    transport: &Arc<T>,
    state: &RetryState,
    url: &str,
    options: &RetryOptions,
) -> Result<T::Response, RetryError<T::Error>> {
    let options = options.resolve(&state.snapshot());
    let ctx = Arc::new(AttemptContext {
        transport: Arc::clone(transport),
        state: state.clone(),
        url: url.to_string(),
        status_codes: options.status_codes.clone(),
    });
    let start = Instant::now();
    let mut active = ActiveAttempts::new();
    let mut remaining = options.total_timeout;
    let mut soft_timeout = options.timeout;
    let mut launched = 0u32;

    let all_failed = |attempts: u32, error: AttemptError<T::Error>| RetryError::AllAttemptsFailed {
        url: url.to_string(),
        attempts,
        elapsed: start.elapsed(),
        last_error: error,
    };

    for number in 0..=options.retries {
        if remaining.is_zero() {
            tracing::debug!(url, attempt = number, "total timeout budget spent");
            break;
        }

        let attempt = Attempt::new(number, soft_timeout, remaining);
        launched += 1;
        match race_one_attempt(&ctx, attempt, &mut active).await {
            Ok(AttemptOutcome::Settled(response)) => return Ok(response),
            Ok(AttemptOutcome::Pending { .. }) => {
                remaining = remaining.saturating_sub(soft_timeout);
                tracing::debug!(
                    url,
                    attempt = number,
                    soft_timeout_ms = as_millis_u64(soft_timeout),
                    active = active.len(),
                    "soft timeout passed, launching another attempt"
                );
                soft_timeout = scale(soft_timeout, options.growth_factor);
            }
            Err(error) => {
                tracing::warn!(url, attempts = launched, "raced attempt failed");
                return Err(all_failed(launched, error));
            }
        }
    }

    match active.first_success().await {
        Ok(response) => Ok(response),
        Err(last_error) => {
            tracing::warn!(url, attempts = launched, "all raced attempts failed");
            let error = last_error.unwrap_or(AttemptError::Aborted {
                timeout: options.total_timeout,
            });
            Err(all_failed(launched, error))
        }
    }
}
