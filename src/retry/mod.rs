//! Retry executors.
//!
//! Two ways of retrying a request, sharing the same configuration and the
//! same dynamic timeout controller:
//!
//! - **Sequential** ([`execute_sequential`]): one attempt at a time. An
//!   attempt that runs past its deadline is cancelled, and the next one gets
//!   a deadline `growth_factor` times longer.
//! - **Raced** ([`execute_raced`]): an attempt that runs past its *soft*
//!   deadline is left running while the next one starts. Whichever attempt
//!   answers first wins. This trades extra load for lower tail latency.
//!
//! # Quick Start
//!
//! ```rust
//! use undertow::testing::MockTransport;
//! use undertow::{RetryClient, RetryOptions};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new()
//!     .reply(Duration::from_millis(80), 200)
//!     .reply(Duration::from_millis(5), 200);
//!
//! let client = RetryClient::new(transport);
//! let options = RetryOptions::new()
//!     .retries(3)
//!     .timeout(Duration::from_millis(20));
//!
//! // The first attempt is left running after 20ms; a second one is
//! // launched and answers first.
//! let response = client
//!     .fetch_with_raced_retries("http://example.com", &options)
//!     .await
//!     .unwrap();
//! assert_eq!(response.status, 200);
//! # });
//! ```
//!
//! # Errors
//!
//! Intermediate failures are only logged. An execution either returns a
//! response or exactly one [`RetryError`](crate::RetryError):
//!
//! - [`RetriesExhausted`](crate::RetryError::RetriesExhausted) from the
//!   sequential executor
//! - [`AllAttemptsFailed`](crate::RetryError::AllAttemptsFailed) from the
//!   raced executor

mod race;
mod sequential;

pub use race::execute_raced;
pub use sequential::execute_sequential;
