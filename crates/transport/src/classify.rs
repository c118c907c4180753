//! Error classification for attempt outcomes
//!
//! Maps a failed attempt to a stable taxonomy. The order of checks is fixed:
//! no-response causes first, then server errors, then 401 ahead of the
//! generic 4xx range.

use std::fmt;

use crate::{AttemptOutcome, TransportError};

/// Classification of a failed attempt.
///
/// - Network, Timeout, Server are transient and handled by the retry policy
/// - Auth is routed to the refresh coordinator
/// - Client and Unknown are surfaced to the caller immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response, transport-level failure (DNS, connect, reset)
    Network,
    /// No response before the per-attempt deadline
    Timeout,
    /// Status >= 500
    Server,
    /// Status 400..500 other than 401
    Client,
    /// Status 401
    Auth,
    /// Anything else (1xx, 3xx, malformed success payload)
    Unknown,
}

impl ErrorKind {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Auth => "auth",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether a blind retry of the same request can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify an attempt outcome. Returns `None` for a 2xx response.
pub fn classify(outcome: &AttemptOutcome) -> Option<ErrorKind> {
    match outcome {
        Err(TransportError::Timeout(_)) => Some(ErrorKind::Timeout),
        Err(TransportError::Network(_)) => Some(ErrorKind::Network),
        Ok(response) => classify_status(response.status),
    }
}

/// Classify a received status code. Returns `None` for 2xx.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        200..=299 => None,
        500.. => Some(ErrorKind::Server),
        401 => Some(ErrorKind::Auth),
        400..=499 => Some(ErrorKind::Client),
        _ => Some(ErrorKind::Unknown),
    }
}
