//! Session credential storage and token refresh
//!
//! Owns the persisted access/refresh token pair and the minimal identity
//! record, plus the single-attempt call to the refresh endpoint. This crate
//! has no knowledge of retries or request queueing; the session client
//! composes it with the refresh coordinator.
//!
//! Credential flow:
//! 1. Login response saved via `credentials::CredentialStore::save()`
//! 2. Every request reads `CredentialStore::load()` (expired records vanish)
//! 3. On 401 the refresh leader calls `token::refresh_token()` once
//! 4. The new pair is saved wholesale, or the store is cleared on failure

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore, Identity, StoreOptions};
pub use error::{Error, Result};
pub use token::{LoginTokens, RefreshedTokens, join_url, refresh_token};
