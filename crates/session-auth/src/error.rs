//! Error types for credential storage and refresh

/// Errors from the credential store and the refresh endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
