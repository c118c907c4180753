//! Client construction settings

use std::time::Duration;

use session_auth::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use transport::HeaderMap;

use crate::retry::RetryPolicy;

/// Settings shared by every request a `SessionClient` sends.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request paths
    pub base_url: String,
    /// Per-attempt deadline
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Sent with every request; per-request headers win on conflict
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            default_headers: HeaderMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5046");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::default()
            .with_base_url("https://api.example.com")
            .with_timeout(Duration::from_secs(3))
            .with_retry(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::ZERO,
            });
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 1);
    }
}
