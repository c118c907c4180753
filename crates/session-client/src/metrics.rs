//! Client-side counters
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.
//!
//! - `session_requests_total` (counter): label `outcome` (`ok` or an error label)
//! - `session_refresh_total` (counter): label `outcome` (`success`, `failure`, `reused`)
//! - `session_retries_total` (counter): label `kind`

/// Record a finished `execute` call.
pub fn record_request(outcome: &str) {
    metrics::counter!("session_requests_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the end of a refresh cycle as seen by its leader.
pub fn record_refresh(outcome: &str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a transient failure that is about to be retried.
pub fn record_retry(kind: &str) {
    metrics::counter!("session_retries_total", "kind" => kind.to_string()).increment(1);
}
