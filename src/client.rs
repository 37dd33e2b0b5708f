//! The user-facing retrying client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument as _;

use crate::attempt;
use crate::config::{RetryConfig, RetryOptions};
use crate::error::{AttemptError, RetryError};
use crate::retry::{execute_raced, execute_sequential};
use crate::state::RetryState;
use crate::transport::Transport;

/// A transport paired with the retry state it reports to.
///
/// Cloning is cheap. Clones share both the transport and the state, so
/// timeouts adapted by one clone's requests apply to all of them.
///
/// # Examples
///
/// ```rust
/// use undertow::testing::MockTransport;
/// use undertow::{RetryClient, RetryConfig, RetryOptions};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let transport = MockTransport::new()
///     .reply(Duration::ZERO, 502)
///     .reply(Duration::ZERO, 200);
///
/// let client = RetryClient::with_config(
///     transport,
///     RetryConfig::default().with_timeout(Duration::from_millis(250)),
/// );
///
/// let response = client
///     .fetch_with_retry("http://example.com", &RetryOptions::new())
///     .await
///     .unwrap();
/// assert_eq!(response.status, 200);
/// # });
/// ```
pub struct RetryClient<T> {
    transport: Arc<T>,
    state: RetryState,
}

impl<T> Clone for RetryClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: self.state.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RetryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryClient")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .finish()
    }
}

impl<T: Transport> RetryClient<T> {
    /// A client with its own state, seeded with the default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_state(transport, RetryState::default())
    }

    /// A client with its own state, seeded with `config`.
    pub fn with_config(transport: T, config: RetryConfig) -> Self {
        Self::with_state(transport, RetryState::new(config))
    }

    /// A client reporting to an existing state.
    ///
    /// Use this to let several clients adapt one base timeout together.
    pub fn with_state(transport: T, state: RetryState) -> Self {
        Self {
            transport: Arc::new(transport),
            state,
        }
    }

    /// The shared retry state.
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// One request, cancelled after `timeout`.
    ///
    /// No retries, no status classification and no controller feedback.
    pub async fn fetch_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T::Response, AttemptError<T::Error>> {
        attempt::fetch_with_timeout(self.transport.as_ref(), url, timeout).await
    }

    /// Retry `url` one attempt at a time with growing timeouts.
    ///
    /// See [`execute_sequential`].
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        options: &RetryOptions,
    ) -> Result<T::Response, RetryError<T::Error>> {
        execute_sequential(self.transport.as_ref(), &self.state, url, options)
            .instrument(tracing::debug_span!("fetch_with_retry", url))
            .await
    }

    /// Retry `url` with overlapping attempts; the first success wins.
    ///
    /// See [`execute_raced`].
    pub async fn fetch_with_raced_retries(
        &self,
        url: &str,
        options: &RetryOptions,
    ) -> Result<T::Response, RetryError<T::Error>> {
        execute_raced(&self.transport, &self.state, url, options)
            .instrument(tracing::debug_span!("fetch_with_raced_retries", url))
            .await
    }
}

#[cfg(test)]
mod client_tests {
    use super::*;
    use crate::testing::MockTransport;

    const URL: &str = "http://example.com";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_timeout_does_not_retry() {
        let transport = MockTransport::new()
            .reply(ms(5), 503)
            .reply(ms(5), 200);
        let client = RetryClient::new(transport.clone());

        let response = client.fetch_with_timeout(URL, ms(100)).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_timeout_does_not_feed_controller() {
        let client = RetryClient::new(MockTransport::new().reply(ms(5), 200));

        client.fetch_with_timeout(URL, ms(100)).await.unwrap();

        assert_eq!(client.state().average_response_time(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_retry_uses_shared_config() {
        let transport = MockTransport::new().always(ms(5), 500);
        let client = RetryClient::with_config(transport.clone(), RetryConfig::default().with_retries(2));

        let err = client
            .fetch_with_retry(URL, &RetryOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_options_override_shared_config() {
        let transport = MockTransport::new().always(ms(5), 500);
        let client = RetryClient::with_config(transport.clone(), RetryConfig::default().with_retries(2));

        let err = client
            .fetch_with_retry(URL, &RetryOptions::new().retries(0))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert_eq!(client.state().snapshot().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_raced_retries() {
        let client = RetryClient::new(
            MockTransport::new()
                .reply(ms(300), 200)
                .reply(ms(10), 201),
        );
        let options = RetryOptions::new().timeout(ms(100));

        let response = client.fetch_with_raced_retries(URL, &options).await.unwrap();

        assert_eq!(response.status, 201);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_sharing_state_adapt_together() {
        let state = RetryState::new(
            RetryConfig::default()
                .with_timeout(ms(100))
                .with_heuristic_threshold(2),
        );
        let slow = RetryClient::with_state(MockTransport::new().always(ms(90), 200), state.clone());
        let other = RetryClient::with_state(MockTransport::new(), state.clone());

        slow.fetch_with_retry(URL, &RetryOptions::new()).await.unwrap();
        slow.fetch_with_retry(URL, &RetryOptions::new()).await.unwrap();

        assert_eq!(other.state().timeout(), ms(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_clients_are_isolated() {
        let config = RetryConfig::default()
            .with_timeout(ms(100))
            .with_heuristic_threshold(1);
        let slow = RetryClient::with_config(MockTransport::new().always(ms(90), 200), config.clone());
        let other = RetryClient::with_config(MockTransport::new(), config);

        slow.fetch_with_retry(URL, &RetryOptions::new()).await.unwrap();

        assert_eq!(slow.state().timeout(), ms(200));
        assert_eq!(other.state().timeout(), ms(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_transport_and_state() {
        let transport = MockTransport::new().always(ms(1), 200);
        let client = RetryClient::new(transport.clone());
        let clone = client.clone();

        clone.fetch_with_retry(URL, &RetryOptions::new()).await.unwrap();

        assert_eq!(client.transport().request_count(), 1);
        assert!(client.state().average_response_time().is_some());
    }
}
