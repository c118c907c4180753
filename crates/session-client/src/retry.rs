//! Bounded retry policy for transient failures
//!
//! Only Network, Timeout and Server failures are retried. Auth failures take
//! the refresh path instead and Client/Unknown failures are final.

use std::time::Duration;

use transport::ErrorKind;

/// Total attempts (initial try included) when not configured
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry when not configured
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Whether a failed attempt should be retried.
///
/// `attempt_index` is the zero-based index of the attempt that just failed;
/// `max_attempts` counts total attempts.
pub fn should_retry(kind: ErrorKind, attempt_index: u32, max_attempts: u32) -> bool {
    kind.is_transient() && attempt_index.saturating_add(1) < max_attempts
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, kind: ErrorKind, attempt_index: u32) -> bool {
        should_retry(kind, attempt_index, self.max_attempts)
    }

    /// `base_delay * 2^attempt_index`, saturating.
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_never_retried() {
        for attempt in 0..5 {
            assert!(!should_retry(ErrorKind::Auth, attempt, 3));
            assert!(!should_retry(ErrorKind::Auth, attempt, 100));
        }
    }

    #[test]
    fn client_and_unknown_are_never_retried() {
        assert!(!should_retry(ErrorKind::Client, 0, 3));
        assert!(!should_retry(ErrorKind::Unknown, 0, 3));
    }

    #[test]
    fn server_retried_while_attempts_remain() {
        assert!(should_retry(ErrorKind::Server, 0, 3));
        assert!(should_retry(ErrorKind::Server, 1, 3));
        assert!(!should_retry(ErrorKind::Server, 2, 3));
        assert!(!should_retry(ErrorKind::Server, 3, 3));
    }

    #[test]
    fn network_and_timeout_are_retryable() {
        assert!(should_retry(ErrorKind::Network, 0, 3));
        assert!(should_retry(ErrorKind::Timeout, 0, 3));
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        assert!(!should_retry(ErrorKind::Server, 0, 1));
        assert!(!should_retry(ErrorKind::Server, 0, 0));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_delay(64), Duration::from_secs(u64::from(u32::MAX)));
    }
}
