//! Credential storage for the session token pair
//!
//! Manages a JSON file holding two records: `user_token` (the access/refresh
//! pair with issue and expiry timestamps) and `user_info` (the minimal user
//! identity). All writes use atomic temp-file + rename to prevent corruption
//! on crash. A tokio Mutex guards the in-memory records so no reader ever
//! observes a half-applied save or clear.
//!
//! Timestamps are unix epoch milliseconds.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_TTL, IDENTITY_RECORD_KEY, TOKEN_RECORD_KEY};
use crate::error::{Error, Result};

/// Raw records as persisted. Kept as JSON values so a structurally invalid
/// record can be detected (and dropped) at read time.
type Records = HashMap<String, Value>;

/// The current access/refresh token pair.
///
/// Serialized as `{token, refreshToken, timestamp, expireTime}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: String,
    /// When the credential was stored
    #[serde(rename = "timestamp", default)]
    pub issued_at: u64,
    /// Absolute expiry; the credential is valid while `now < expires_at`
    #[serde(rename = "expireTime")]
    pub expires_at: u64,
}

impl Credential {
    /// Whether the credential is still usable at `now_ms`.
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at
    }

    /// `expires_at - issued_at`
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(self.issued_at))
    }

    fn is_well_formed(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at > self.issued_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Minimal user identity stored next to the credential.
///
/// `id` is sent as `userId` on refresh. Servers return it either as a string
/// or a number; both are accepted and stored as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub account: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub avatar: String,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub timestamp: u64,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid user id: {other}"))),
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Store behavior knobs.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Lifetime stamped onto each saved credential. Must be non-zero.
    pub ttl: Duration,
    /// When set, an empty refresh token is replaced by the access token
    /// instead of rejecting the save. A leaked access token can then mint new
    /// sessions, so deployments that control the login endpoint should turn
    /// this off.
    pub allow_degraded_refresh_token: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            allow_degraded_refresh_token: true,
        }
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Thread-safe credential file manager.
///
/// Every operation takes the same Mutex, so `save`, `clear` and `load` are
/// mutually exclusive and a process always reads its own writes.
pub struct CredentialStore {
    path: PathBuf,
    options: StoreOptions,
    state: Mutex<Records>,
}

impl CredentialStore {
    /// Open the store file at `path`.
    ///
    /// A missing file is created as `{}`. An unreadable JSON document is
    /// treated as empty and rewritten (the session is lost, not the process).
    /// An already expired credential is dropped before the store is returned.
    pub async fn open(path: PathBuf, options: StoreOptions) -> Result<Self> {
        if options.ttl.is_zero() {
            return Err(Error::InvalidCredential(
                "credential ttl must be greater than zero".into(),
            ));
        }

        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            match serde_json::from_str::<Records>(&contents) {
                Ok(records) => {
                    info!(path = %path.display(), records = records.len(), "loaded session store");
                    records
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session store is corrupt, starting empty");
                    let records = Records::new();
                    write_atomic(&path, &records).await?;
                    records
                }
            }
        } else {
            info!(path = %path.display(), "session store not found, starting empty");
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Io(format!("creating session store directory: {e}")))?;
            }
            let records = Records::new();
            write_atomic(&path, &records).await?;
            records
        };

        let store = Self {
            path,
            options,
            state: Mutex::new(state),
        };
        store.cleanup_expired().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Persist a new token pair, replacing any previous credential wholesale.
    ///
    /// Stamps `issued_at = now` and `expires_at = now + ttl`.
    pub async fn save(&self, access: &str, refresh: &str) -> Result<Credential> {
        if access.trim().is_empty() {
            return Err(Error::InvalidCredential("access token is empty".into()));
        }

        let refresh = if refresh.trim().is_empty() {
            if !self.options.allow_degraded_refresh_token {
                return Err(Error::InvalidCredential("refresh token is empty".into()));
            }
            warn!("refresh token missing, reusing access token as refresh token");
            access
        } else {
            refresh
        };

        let issued_at = now_millis();
        let ttl_millis = u64::try_from(self.options.ttl.as_millis()).unwrap_or(u64::MAX);
        let credential = Credential {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            issued_at,
            expires_at: issued_at.saturating_add(ttl_millis),
        };
        let record = serde_json::to_value(&credential)
            .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.insert(TOKEN_RECORD_KEY.to_string(), record);
        write_atomic(&self.path, &next).await?;
        *state = next;

        debug!(expires_at = credential.expires_at, "saved credential");
        Ok(credential)
    }

    /// Current credential, or `None` when absent, malformed or expired.
    ///
    /// Malformed and expired records are cleared as a side effect.
    pub async fn load(&self) -> Option<Credential> {
        let mut state = self.state.lock().await;
        let record = state.get(TOKEN_RECORD_KEY)?.clone();

        let credential = match serde_json::from_value::<Credential>(record) {
            Ok(c) if c.is_well_formed() => c,
            Ok(_) => {
                warn!("stored credential is incomplete, clearing session");
                self.clear_locked(&mut state).await;
                return None;
            }
            Err(e) => {
                warn!(error = %e, "stored credential is unreadable, clearing session");
                self.clear_locked(&mut state).await;
                return None;
            }
        };

        if !credential.is_valid_at(now_millis()) {
            info!(expired_at = credential.expires_at, "credential expired, clearing session");
            self.clear_locked(&mut state).await;
            return None;
        }

        Some(credential)
    }

    /// Remove the credential and the identity. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let had_token = state.remove(TOKEN_RECORD_KEY).is_some();
        let had_identity = state.remove(IDENTITY_RECORD_KEY).is_some();
        if had_token || had_identity {
            write_atomic(&self.path, &state).await?;
            debug!("cleared session");
        }
        Ok(())
    }

    /// Time until the stored credential expires; zero when absent.
    pub async fn remaining_ttl(&self) -> Duration {
        let state = self.state.lock().await;
        let Some(record) = state.get(TOKEN_RECORD_KEY) else {
            return Duration::ZERO;
        };
        match Credential::deserialize(record) {
            Ok(c) => Duration::from_millis(c.expires_at.saturating_sub(now_millis())),
            Err(_) => Duration::ZERO,
        }
    }

    /// Persist the identity record. `id` must be non-empty.
    pub async fn save_identity(&self, identity: Identity) -> Result<Identity> {
        if identity.id.trim().is_empty() {
            return Err(Error::InvalidIdentity("user id is empty".into()));
        }
        let identity = Identity {
            timestamp: now_millis(),
            ..identity
        };
        let record = serde_json::to_value(&identity)
            .map_err(|e| Error::CredentialParse(format!("serializing identity: {e}")))?;

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.insert(IDENTITY_RECORD_KEY.to_string(), record);
        write_atomic(&self.path, &next).await?;
        *state = next;

        debug!(user_id = %identity.id, "saved identity");
        Ok(identity)
    }

    /// Stored identity. An unreadable record is removed.
    pub async fn identity(&self) -> Option<Identity> {
        let mut state = self.state.lock().await;
        let record = state.get(IDENTITY_RECORD_KEY)?.clone();
        match serde_json::from_value::<Identity>(record) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "stored identity is unreadable, removing it");
                state.remove(IDENTITY_RECORD_KEY);
                if let Err(e) = write_atomic(&self.path, &state).await {
                    warn!(error = %e, "failed to persist identity removal");
                }
                None
            }
        }
    }

    /// A valid credential and an identity are both present.
    pub async fn is_logged_in(&self) -> bool {
        self.load().await.is_some() && self.identity().await.is_some()
    }

    /// Drop an expired credential record, leaving the identity in place.
    ///
    /// Returns whether anything was removed.
    pub async fn cleanup_expired(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let expired = state
            .get(TOKEN_RECORD_KEY)
            .and_then(|record| Credential::deserialize(record).ok())
            .is_some_and(|c| !c.is_valid_at(now_millis()));
        if !expired {
            return Ok(false);
        }
        state.remove(TOKEN_RECORD_KEY);
        write_atomic(&self.path, &state).await?;
        info!("removed expired credential");
        Ok(true)
    }

    /// Clear both records while already holding the lock. Used by `load`,
    /// where the record is unusable whether or not the disk write succeeds.
    async fn clear_locked(&self, state: &mut Records) {
        state.remove(TOKEN_RECORD_KEY);
        state.remove(IDENTITY_RECORD_KEY);
        if let Err(e) = write_atomic(&self.path, state).await {
            warn!(error = %e, "failed to persist session clear");
        }
    }
}

/// Distinguishes temp files of concurrent writers in one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, data: &Records) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session store: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("session store path has no parent directory".into())),
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session");
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}.{seq}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn open_store(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::open(dir.path().join("session.json"), StoreOptions::default())
            .await
            .unwrap()
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.into(),
            user_name: "Ada".into(),
            email: "ada@example.com".into(),
            account: "ada".into(),
            avatar: String::new(),
            is_authenticated: true,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_saved_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let saved = store.save("A1", "R1").await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, saved);
        assert_eq!(loaded.access_token, "A1");
        assert_eq!(loaded.refresh_token, "R1");
        assert_eq!(loaded.lifetime(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn lifetime_matches_configured_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            ttl: Duration::from_secs(90),
            ..StoreOptions::default()
        };
        let store = CredentialStore::open(dir.path().join("session.json"), options)
            .await
            .unwrap();

        store.save("A1", "R1").await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.expires_at - loaded.issued_at, 90_000);
    }

    #[tokio::test]
    async fn reopened_store_sees_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = CredentialStore::open(path.clone(), StoreOptions::default())
            .await
            .unwrap();
        store.save("A1", "R1").await.unwrap();
        store.save_identity(identity("42")).await.unwrap();
        drop(store);

        let reopened = CredentialStore::open(path, StoreOptions::default())
            .await
            .unwrap();
        assert_eq!(reopened.load().await.unwrap().access_token, "A1");
        assert_eq!(reopened.identity().await.unwrap().id, "42");
    }

    #[tokio::test]
    async fn persisted_layout_uses_record_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();
        store.save_identity(identity("7")).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["user_token"]["token"], "A1");
        assert_eq!(json["user_token"]["refreshToken"], "R1");
        assert!(json["user_token"]["timestamp"].is_u64());
        assert!(json["user_token"]["expireTime"].is_u64());
        assert_eq!(json["user_info"]["id"], "7");
        assert_eq!(json["user_info"]["userName"], "Ada");
        assert_eq!(json["user_info"]["isAuthenticated"], true);
    }

    #[tokio::test]
    async fn empty_access_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let err = store.save("", "R1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential(_)), "got {err:?}");
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn degraded_mode_reuses_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let saved = store.save("A1", "").await.unwrap();
        assert_eq!(saved.refresh_token, "A1");
    }

    #[tokio::test]
    async fn empty_refresh_token_rejected_without_degraded_mode() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            allow_degraded_refresh_token: false,
            ..StoreOptions::default()
        };
        let store = CredentialStore::open(dir.path().join("session.json"), options)
            .await
            .unwrap();

        let err = store.save("A1", "").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            ttl: Duration::ZERO,
            ..StoreOptions::default()
        };
        let result = CredentialStore::open(dir.path().join("session.json"), options).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn expired_credential_is_absent_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            ttl: Duration::from_millis(1),
            ..StoreOptions::default()
        };
        let store = CredentialStore::open(dir.path().join("session.json"), options)
            .await
            .unwrap();
        store.save("A1", "R1").await.unwrap();
        store.save_identity(identity("1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.load().await.is_none());
        assert!(store.identity().await.is_none());

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: Value = serde_json::from_str(&contents).unwrap();
        assert!(json.get("user_token").is_none(), "file: {contents}");
    }

    #[tokio::test]
    async fn expired_record_on_disk_is_cleaned_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let stale = serde_json::json!({
            "user_token": {"token": "A0", "refreshToken": "R0", "timestamp": 1_000, "expireTime": 2_000},
            "user_info": {"id": "9", "userName": "old"}
        });
        std::fs::write(&path, stale.to_string()).unwrap();

        let store = CredentialStore::open(path.clone(), StoreOptions::default())
            .await
            .unwrap();
        assert!(store.load().await.is_none());
        // Cleanup only drops the token; identity survives until logout
        assert_eq!(store.identity().await.unwrap().id, "9");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("A0"));
    }

    #[tokio::test]
    async fn malformed_record_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"user_token":{"refreshToken":"R0"}}"#).unwrap();

        let store = CredentialStore::open(path.clone(), StoreOptions::default())
            .await
            .unwrap();
        assert!(store.load().await.is_none());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("R0"), "file: {contents}");
    }

    #[tokio::test]
    async fn record_with_empty_token_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let far = now_millis() + 3_600_000;
        let record = serde_json::json!({
            "user_token": {"token": "", "refreshToken": "R0", "timestamp": 1, "expireTime": far}
        });
        std::fs::write(&path, record.to_string()).unwrap();

        let store = CredentialStore::open(path, StoreOptions::default())
            .await
            .unwrap();
        assert!(store.load().await.is_none());
        assert_eq!(store.remaining_ttl().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json {{").unwrap();

        let store = CredentialStore::open(path.clone(), StoreOptions::default())
            .await
            .unwrap();
        assert!(store.load().await.is_none());

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Records = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn cold_start_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = CredentialStore::open(path.clone(), StoreOptions::default())
            .await
            .unwrap();
        assert!(path.exists());
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_removes_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();
        store.save_identity(identity("1")).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.is_none());
        assert!(store.identity().await.is_none());
        assert!(!store.is_logged_in().await);
    }

    #[tokio::test]
    async fn remaining_ttl_tracks_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.remaining_ttl().await, Duration::ZERO);

        store.save("A1", "R1").await.unwrap();
        let remaining = store.remaining_ttl().await;
        assert!(remaining <= DEFAULT_TTL);
        assert!(remaining > DEFAULT_TTL - Duration::from_secs(60));
    }

    #[test]
    fn identity_accepts_numeric_id_and_null_fields() {
        let raw = serde_json::json!({"id": 42, "userName": "Ada", "avatar": null});
        let identity: Identity = serde_json::from_value(raw).unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.avatar, "");
        assert!(!identity.is_authenticated);
    }

    #[tokio::test]
    async fn identity_with_empty_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let err = store.save_identity(identity(" ")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn logged_in_requires_credential_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();
        assert!(!store.is_logged_in().await);

        store.save_identity(identity("1")).await.unwrap();
        assert!(store.is_logged_in().await);
    }

    #[test]
    fn debug_redacts_tokens() {
        let credential = Credential {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            issued_at: 1,
            expires_at: 2,
        };
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("expires_at"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.save("A1", "R1").await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_saves_leave_one_whole_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir).await);

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save(&format!("A{i}"), &format!("R{i}"))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Whichever save won, access and refresh come from the same call
        let loaded = store.load().await.unwrap();
        assert_eq!(&loaded.access_token[1..], &loaded.refresh_token[1..]);

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let parsed: Records = serde_json::from_str(&contents).unwrap();
        let on_disk: Credential = serde_json::from_value(parsed["user_token"].clone()).unwrap();
        assert_eq!(on_disk, loaded);
    }

    #[tokio::test]
    async fn stores_sharing_a_directory_write_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(open_store(&dir).await);
        let second = Arc::new(
            CredentialStore::open(dir.path().join("other.json"), StoreOptions::default())
                .await
                .unwrap(),
        );

        let mut handles = vec![];
        for i in 0..10 {
            let store = if i % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move {
                store.save(&format!("A{i}"), &format!("R{i}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(first.load().await.is_some());
        assert!(second.load().await.is_some());

        let mut names = vec![];
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, ["other.json", "session.json"]);
    }
}
