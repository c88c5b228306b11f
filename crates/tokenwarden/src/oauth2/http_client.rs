//! reqwest adapter for the oauth2 crate
//!
//! Implements `oauth2::AsyncHttpClient` over a reqwest client we configure ourselves.
//! The client never follows redirects; token endpoints must answer directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use oauth2::AsyncHttpClient;
use oauth2::http::{self, HeaderValue, StatusCode};
use thiserror::Error;

/// HTTP request type used by oauth2
pub type HttpRequest = http::Request<Vec<u8>>;
/// HTTP response type used by oauth2
pub type HttpResponse = http::Response<Vec<u8>>;

/// Default transport timeout for token endpoint calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while talking to a token endpoint
#[derive(Debug, Error)]
pub enum HttpAdapterError {
    /// Request execution failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid method, status or header value
    #[error("invalid HTTP message: {0}")]
    InvalidMessage(String),

    /// Response body read failed
    #[error("failed to read response body: {0}")]
    BodyRead(String),
}

/// Token endpoint HTTP client
#[derive(Clone)]
pub struct OAuth2HttpClient {
    inner: reqwest::Client,
}

impl OAuth2HttpClient {
    /// Create a client with redirects disabled and the default timeout
    pub fn new() -> Result<Self, HttpAdapterError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with redirects disabled and a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpAdapterError> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self { inner })
    }

    /// Wrap an existing reqwest client
    ///
    /// The client should be built with `redirect::Policy::none()`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpAdapterError> {
        let (parts, body) = request.into_parts();

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|_| HttpAdapterError::InvalidMessage(format!("method {}", parts.method)))?;

        let mut req_builder = self.inner.request(method, parts.uri.to_string());
        for (name, value) in &parts.headers {
            req_builder = req_builder.header(name.as_str(), value.as_bytes());
        }

        let response = req_builder.body(body).send().await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| HttpAdapterError::InvalidMessage(e.to_string()))?;

        let mut builder = http::Response::builder().status(status);
        for (name, value) in response.headers() {
            let header_value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| HttpAdapterError::InvalidMessage(e.to_string()))?;
            builder = builder.header(name.as_str(), header_value);
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| HttpAdapterError::BodyRead(e.to_string()))?;

        builder
            .body(body_bytes.to_vec())
            .map_err(|e| HttpAdapterError::InvalidMessage(e.to_string()))
    }
}

impl std::fmt::Debug for OAuth2HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2HttpClient")
            .field("inner", &"<reqwest::Client>")
            .finish()
    }
}

/// Future returned by [`OAuth2HttpClient`]
pub type OAuth2HttpFuture<'c> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, HttpAdapterError>> + Send + 'c>>;

impl<'c> AsyncHttpClient<'c> for OAuth2HttpClient {
    type Error = HttpAdapterError;
    type Future = OAuth2HttpFuture<'c>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move { self.execute(request).await })
    }
}
