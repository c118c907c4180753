//! Authenticated HTTP client with single-flight session refresh
//!
//! Wraps a `Transport` and a `CredentialStore` into a `SessionClient` that
//! attaches the stored access token to every request and keeps the session
//! alive when the server starts answering 401.
//!
//! Request lifecycle:
//! 1. Stored credential attached as `Authorization: Bearer <token>`
//! 2. One attempt sent through the transport, outcome classified
//! 3. 401 → `RefreshCoordinator` elects one leader to call the refresh
//!    endpoint; concurrent 401s wait for its outcome
//! 4. Refresh success → the request is retried once with the new token
//! 5. Refresh failure → credentials cleared, `Error::SessionExpired`,
//!    `SessionObserver::on_session_expired` fired once
//! 6. Network, timeout and 5xx failures retried with exponential backoff

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use client::{ApiRequest, LoginOutcome, SessionClient};
pub use config::ClientConfig;
pub use coordinator::{RefreshCoordinator, RefreshFailure, RefreshOutcome, Role};
pub use error::{Error, Result};
pub use observer::{NoopObserver, SessionObserver, TracingObserver};
pub use retry::{RetryPolicy, should_retry};
pub use transport::MultipartForm;
