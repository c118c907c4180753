//! Hooks for the surrounding application
//!
//! The client never decides how to show a failure or where to send the user
//! when the session is gone. It reports those events to a `SessionObserver`
//! and the application reacts (notification, navigation to login, ...).

use tracing::{error, warn};

use crate::error::Error;

/// Receives session-level events. All methods default to no-ops.
///
/// Calls are made from the request path and must not block.
pub trait SessionObserver: Send + Sync {
    /// The refresh failed and local credentials were cleared. Fired once per
    /// failed refresh cycle, not once per waiting request.
    fn on_session_expired(&self, _reason: &str) {}

    /// A request failed after retries and refresh were exhausted.
    fn on_request_failed(&self, _error: &Error) {}

    /// The server answered but its envelope reported failure.
    fn on_business_failure(&self, _message: &str) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_session_expired(&self, reason: &str) {
        error!(reason, "session expired, login required");
    }

    fn on_request_failed(&self, error: &Error) {
        warn!(kind = error.label(), status = ?error.status(), error = %error, "request failed");
    }

    fn on_business_failure(&self, message: &str) {
        warn!(message, "request rejected by server");
    }
}
