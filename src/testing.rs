//! Testing utilities.
//!
//! [`MockTransport`] is a scripted [`Transport`]: each request consumes the
//! next queued reply, which is delivered after a configurable delay. Combine
//! it with tokio's paused clock (`#[tokio::test(start_paused = true)]`) for
//! deterministic timing.
//!
//! # Examples
//!
//! ```rust
//! use undertow::testing::MockTransport;
//! use undertow::{RetryClient, RetryOptions};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new()
//!     .reply(Duration::ZERO, 503)
//!     .reply(Duration::ZERO, 200);
//!
//! let client = RetryClient::new(transport.clone());
//! let response = client
//!     .fetch_with_retry("http://example.com", &RetryOptions::new())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(response.status, 200);
//! assert_eq!(transport.request_count(), 2);
//! # });
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::transport::{HttpResponse, Transport};

/// Response produced by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// URL the request was sent to.
    pub url: String,
}

impl HttpResponse for MockResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

/// Transport failure produced by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug, Clone)]
struct Reply {
    delay: Duration,
    result: Result<u16, MockError>,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Reply>,
    fallback: Option<Reply>,
    requests: Vec<String>,
}

/// A scripted transport for tests.
///
/// Replies are consumed in request order. When the queue is empty the
/// fallback reply is used, or the request fails with a [`MockError`] if
/// there is none. Clones share the same script and request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    /// A transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, reply: Reply, times: usize) -> Self {
        self.lock()
            .queue
            .extend(std::iter::repeat(reply).take(times));
        self
    }

    /// Queue a response with `status` delivered after `delay`.
    pub fn reply(self, delay: Duration, status: u16) -> Self {
        self.reply_times(delay, status, 1)
    }

    /// Queue the same response `times` times.
    pub fn reply_times(self, delay: Duration, status: u16, times: usize) -> Self {
        self.push(
            Reply {
                delay,
                result: Ok(status),
            },
            times,
        )
    }

    /// Queue a transport error delivered after `delay`.
    pub fn fail(self, delay: Duration, message: &str) -> Self {
        self.push(
            Reply {
                delay,
                result: Err(MockError(message.to_string())),
            },
            1,
        )
    }

    /// Answer every request beyond the queue with `status` after `delay`.
    pub fn always(self, delay: Duration, status: u16) -> Self {
        self.lock().fallback = Some(Reply {
            delay,
            result: Ok(status),
        });
        self
    }

    /// URLs of every request sent so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().queue.len()
    }
}

impl Transport for MockTransport {
    type Response = MockResponse;
    type Error = MockError;

    fn send(&self, url: &str) -> impl Future<Output = Result<MockResponse, MockError>> + Send {
        let mut script = self.lock();
        script.requests.push(url.to_string());
        let reply = match script.queue.pop_front() {
            Some(reply) => Some(reply),
            None => script.fallback.clone(),
        };
        drop(script);
        let url = url.to_string();

        async move {
            let reply = reply.ok_or_else(|| MockError(format!("no reply scripted for {}", url)))?;
            tokio::time::sleep(reply.delay).await;
            reply.result.map(|status| MockResponse { status, url })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_replies_in_order() {
        let transport = MockTransport::new()
            .reply(Duration::ZERO, 500)
            .reply(Duration::ZERO, 200);

        assert_eq!(transport.send("a").await.unwrap().status, 500);
        assert_eq!(transport.send("b").await.unwrap().status, 200);
        assert_eq!(transport.requests(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscripted_request_fails() {
        let transport = MockTransport::new();

        let err = transport.send("http://example.com").await.unwrap_err();

        assert!(err.0.contains("no reply scripted"));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_queue() {
        let transport = MockTransport::new()
            .reply_times(Duration::ZERO, 503, 2)
            .always(Duration::ZERO, 204);

        assert_eq!(transport.remaining(), 2);
        for expected in [503, 503, 204, 204] {
            assert_eq!(transport.send("x").await.unwrap().status, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let transport = MockTransport::new().reply(Duration::from_millis(250), 200);
        let start = tokio::time::Instant::now();

        transport.send("x").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error() {
        let transport = MockTransport::new().fail(Duration::ZERO, "reset");
        assert_eq!(
            transport.send("x").await.unwrap_err(),
            MockError("reset".to_string())
        );
    }
}
