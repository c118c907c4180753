//! Error types surfaced by the session client

use transport::ErrorKind;

/// Errors returned from `SessionClient` operations.
///
/// `Request` carries the classified transport/server failures. `Business` is
/// a successful round trip whose envelope reported failure. `SessionExpired`
/// is terminal: the refresh failed and all local credential state is gone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{kind} failure{}: {message}", status_suffix(.status))]
    Request {
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("request rejected: {0}")]
    Business(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential store error: {0}")]
    Store(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl Error {
    /// Classification for `Request` errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Request { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request { status, .. } => *status,
            _ => None,
        }
    }

    /// A later retry may succeed ("try again" rather than "log in again").
    pub fn is_transient(&self) -> bool {
        self.kind().is_some_and(|k| k.is_transient())
    }

    /// The user has to log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired(_))
    }

    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Request { kind, .. } => kind.label(),
            Error::Business(_) => "business",
            Error::SessionExpired(_) => "session_expired",
            Error::InvalidCredential(_) => "invalid_credential",
            Error::Store(_) => "store",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<session_auth::Error> for Error {
    fn from(e: session_auth::Error) -> Self {
        match e {
            session_auth::Error::InvalidCredential(msg)
            | session_auth::Error::InvalidIdentity(msg) => Error::InvalidCredential(msg),
            session_auth::Error::Io(msg) | session_auth::Error::CredentialParse(msg) => {
                Error::Store(msg)
            }
            session_auth::Error::RefreshRejected(msg) | session_auth::Error::Refresh(msg) => {
                Error::SessionExpired(msg)
            }
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
