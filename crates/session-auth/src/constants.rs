//! Session endpoint paths and storage defaults
//!
//! Paths are relative to the configured base URL. Record keys name the two
//! entries in the credential file and must stay stable across releases so
//! existing sessions survive an upgrade.

use std::time::Duration;

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:5046";

/// Login endpoint: `{account, password}` -> `{token, refreshToken}`
pub const LOGIN_PATH: &str = "/api/sysuser/login";

/// Refresh endpoint: `{refreshToken, userId}` -> `{refreshToken, token?}`
pub const REFRESH_PATH: &str = "/api/sysuser/refreshToken";

/// Server-side logout
pub const LOGOUT_PATH: &str = "/api/sysuser/logout";

/// Current user detail, used to populate the identity record
pub const DETAIL_PATH: &str = "/api/sysuser/getDetail";

/// Key of the credential record in the store file
pub const TOKEN_RECORD_KEY: &str = "user_token";

/// Key of the identity record in the store file
pub const IDENTITY_RECORD_KEY: &str = "user_info";

/// Credential lifetime when no TTL is configured (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-attempt transport timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
