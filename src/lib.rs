//! # Undertow
//!
//! Adaptive HTTP retries.
//!
//! Undertow wraps a request primitive (a [`Transport`]) with two retry
//! strategies and a feedback loop that tunes their timeouts:
//!
//! - **Sequential retries** cancel a slow attempt and try again with a
//!   timeout `growth_factor` times longer.
//! - **Raced retries** leave a slow attempt running and launch another one
//!   alongside it. The first success wins.
//! - **Dynamic timeouts** watch every attempt's response time and grow or
//!   shrink the shared base timeout when responses are consistently slow or
//!   fast.
//!
//! ## Quick Example
//!
//! ```rust
//! use undertow::testing::MockTransport;
//! use undertow::{RetryClient, RetryConfig, RetryError, RetryOptions};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new().always(Duration::ZERO, 503);
//! let client = RetryClient::with_config(transport, RetryConfig::default().with_retries(2));
//!
//! match client.fetch_with_retry("http://example.com", &RetryOptions::new()).await {
//!     Ok(response) => println!("status {}", response.status),
//!     Err(RetryError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
//!     Err(other) => panic!("unexpected: {}", other),
//! }
//! # });
//! ```
//!
//! ## Features
//!
//! - `reqwest`: [`ReqwestTransport`], a transport backed by `reqwest::Client`
//! - `serde`: `Serialize`/`Deserialize` for [`RetryConfig`], durations in
//!   milliseconds

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod attempt;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod retry;
pub mod state;
pub mod testing;
pub mod transport;

// Re-exports
pub use attempt::{fetch_with_timeout, Attempt, AttemptOutcome};
pub use client::RetryClient;
pub use config::{
    total_timeout, ConfigError, ResolvedOptions, RetryConfig, RetryOptions,
    DEFAULT_DYNAMIC_TIMEOUT, DEFAULT_GROWTH_FACTOR, DEFAULT_HEURISTIC_THRESHOLD,
    DEFAULT_MAX_TIMEOUT, DEFAULT_MIN_TIMEOUT, DEFAULT_RETRIES, DEFAULT_STATUS_CODES,
    DEFAULT_TIMEOUT,
};
pub use controller::Adjustment;
pub use error::{AttemptError, RetryError};
pub use retry::{execute_raced, execute_sequential};
pub use state::RetryState;
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{HttpResponse, Transport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::RetryClient;
    pub use crate::config::{RetryConfig, RetryOptions};
    pub use crate::error::{AttemptError, RetryError};
    pub use crate::state::RetryState;
    pub use crate::transport::{HttpResponse, Transport};
}
