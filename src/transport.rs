//! The request primitive the executors drive.
//!
//! A [`Transport`] performs exactly one request. It knows nothing about
//! timeouts or retries; deadlines are imposed from outside by dropping the
//! returned future. Request details such as method and headers belong to the
//! transport value itself.

use std::future::Future;

/// A response exposing an HTTP-like status code.
pub trait HttpResponse {
    /// Numeric status code of the response.
    fn status(&self) -> u16;
}

/// Performs a single cancellable request.
///
/// Implementations must be cancel-safe: dropping the future returned by
/// [`send`](Transport::send) abandons the request.
///
/// # Examples
///
/// ```rust
/// use undertow::{HttpResponse, Transport};
/// use std::future::Future;
///
/// struct Ok200;
///
/// impl HttpResponse for Ok200 {
///     fn status(&self) -> u16 {
///         200
///     }
/// }
///
/// struct Always;
///
/// impl Transport for Always {
///     type Response = Ok200;
///     type Error = std::io::Error;
///
///     fn send(&self, _url: &str) -> impl Future<Output = Result<Ok200, std::io::Error>> + Send {
///         async { Ok(Ok200) }
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Successful response type.
    type Response: HttpResponse + Send + 'static;
    /// Transport-level failure (connection refused, reset, TLS, ...).
    type Error: Send + 'static;

    /// Issue one request to `url`.
    fn send(&self, url: &str) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use std::future::Future;

    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use reqwest::{Client, Method};

    use super::{HttpResponse, Transport};

    impl HttpResponse for reqwest::Response {
        fn status(&self) -> u16 {
            reqwest::Response::status(self).as_u16()
        }
    }

    /// [`Transport`] backed by a `reqwest::Client`.
    ///
    /// Every request uses the configured method and headers.
    ///
    /// ```rust,no_run
    /// use undertow::{RetryClient, RetryOptions, ReqwestTransport};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = RetryClient::new(ReqwestTransport::new(reqwest::Client::new()));
    /// let response = client
    ///     .fetch_with_retry("http://example.com", &RetryOptions::new())
    ///     .await?;
    /// println!("{}", response.status());
    /// # Ok(())
    /// # }
    /// ```
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
        method: Method,
        headers: HeaderMap,
    }

    impl ReqwestTransport {
        /// `GET` requests through `client`.
        pub fn new(client: Client) -> Self {
            Self {
                client,
                method: Method::GET,
                headers: HeaderMap::new(),
            }
        }

        /// Use `method` for every request.
        pub fn with_method(mut self, method: Method) -> Self {
            self.method = method;
            self
        }

        /// Send `name: value` with every request.
        pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
            self.headers.insert(name, value);
            self
        }
    }

    impl Default for ReqwestTransport {
        fn default() -> Self {
            Self::new(Client::new())
        }
    }

    impl Transport for ReqwestTransport {
        type Response = reqwest::Response;
        type Error = reqwest::Error;

        fn send(
            &self,
            url: &str,
        ) -> impl Future<Output = Result<reqwest::Response, reqwest::Error>> + Send {
            self.client
                .request(self.method.clone(), url)
                .headers(self.headers.clone())
                .send()
        }
    }
}
