//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password is loaded from the SESSION_PASSWORD env var or
//! password_file, never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use session_auth::{DEFAULT_BASE_URL, StoreOptions};
use session_client::{ClientConfig, RetryPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;
use transport::HeaderMap;
use transport::header::{HeaderName, HeaderValue};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub login: LoginSection,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Remote service settings
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

/// Credential store settings
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_true")]
    pub allow_degraded_refresh_token: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginSection {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to SESSION_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// Header to send with every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_true() -> bool {
    true
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            ttl_hours: default_ttl_hours(),
            allow_degraded_refresh_token: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. SESSION_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        let password = if let Ok(password) = std::env::var("SESSION_PASSWORD") {
            Some(Secret::new(password))
        } else if let Some(ref password_file) = config.login.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            Some(Secret::new(
                password.trim_end_matches(['\r', '\n']).to_owned(),
            ))
        } else {
            None
        };
        // Blank passwords count as missing
        config.login.password = password.filter(|p| !p.is_blank());

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.client.base_url
            )));
        }
        if self.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.session.ttl_hours == 0 {
            return Err(common::Error::Config(
                "ttl_hours must be greater than 0".into(),
            ));
        }
        self.default_headers().map(|_| ())
    }

    /// Headers from `[[headers]]`, validated.
    pub fn default_headers(&self) -> common::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for h in &self.headers {
            let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(|e| {
                common::Error::Config(format!("invalid header name {:?}: {e}", h.name))
            })?;
            let value = HeaderValue::from_str(&h.value).map_err(|e| {
                common::Error::Config(format!("invalid value for header {}: {e}", h.name))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    pub fn client_config(&self) -> common::Result<ClientConfig> {
        Ok(ClientConfig {
            base_url: self.client.base_url.clone(),
            timeout: Duration::from_secs(self.client.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
            },
            default_headers: self.default_headers()?,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            ttl: Duration::from_secs(self.session.ttl_hours.saturating_mul(3600)),
            allow_degraded_refresh_token: self.session.allow_degraded_refresh_token,
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-cli.toml")
    }
}
