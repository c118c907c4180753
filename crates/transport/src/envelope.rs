//! JSON response envelope
//!
//! Every endpoint wraps its payload as `{"succeeded": bool, "message": string,
//! "data": T}`. Older servers spell the flag `successed`; both are accepted.

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Response envelope returned by the remote service.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    #[serde(alias = "successed")]
    pub succeeded: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse a response body into an envelope.
    pub fn parse(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

impl<T> Envelope<T> {
    /// Message for a failed envelope, falling back to a generic text.
    pub fn failure_message(&self) -> String {
        match self.message.as_deref() {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => "request failed".to_string(),
        }
    }
}

/// Extract the server-provided `message` from an arbitrary error body, if it
/// is a JSON object carrying one.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
