//! Transport abstraction for the session client
//!
//! Defines the `Transport` trait that decouples the request pipeline from the
//! HTTP stack. `ReqwestTransport` is the production implementation; tests
//! substitute scripted transports that implement the same trait.
//!
//! A single attempt either produces a `TransportResponse` (any status code) or
//! a `TransportError` when no response was received at all. The classifier in
//! [`classify`] turns that outcome into an [`ErrorKind`].

pub mod classify;
pub mod envelope;
pub mod form;
pub mod reqwest_transport;

pub use classify::{ErrorKind, classify, classify_status};
pub use envelope::Envelope;
pub use form::{FormPart, MultipartForm};
pub use reqwest_transport::ReqwestTransport;

pub use reqwest::Method;
pub use reqwest::header;
pub use reqwest::header::HeaderMap;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<MultipartForm> for RequestBody {
    fn from(form: MultipartForm) -> Self {
        Self::Multipart(form)
    }
}

/// One fully resolved outbound HTTP attempt.
///
/// `url` is absolute. The pipeline rebuilds this per attempt so a refreshed
/// credential lands in `headers` before each send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Per-attempt deadline, independent of any retry backoff
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// The bearer token carried by this request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response that made it back from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// No response was received for an attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Result of a single send.
pub type AttemptOutcome = std::result::Result<TransportResponse, TransportError>;

/// Abstraction over the HTTP stack.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest")
    fn id(&self) -> &str;

    /// Perform exactly one attempt. Implementations must not retry.
    fn send<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, HeaderValue};

    #[test]
    fn bearer_token_reads_authorization_header() {
        let mut req = OutboundRequest::new(
            Method::GET,
            "http://localhost/api/items",
            Duration::from_secs(10),
        );
        assert_eq!(req.bearer_token(), None);

        req.headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer at_123"));
        assert_eq!(req.bearer_token(), Some("at_123"));
    }

    #[test]
    fn bearer_token_ignores_other_schemes() {
        let mut req = OutboundRequest::new(
            Method::GET,
            "http://localhost/api/items",
            Duration::from_secs(10),
        );
        req.headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(req.bearer_token(), None);
    }

    #[test]
    fn transport_error_display_names_the_cause() {
        let err = TransportError::Timeout("deadline 10s elapsed".into());
        assert_eq!(err.to_string(), "request timed out: deadline 10s elapsed");
        let err = TransportError::Network("connection refused".into());
        assert_eq!(err.to_string(), "network error: connection refused");
    }
}
