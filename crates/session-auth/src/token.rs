//! Session token endpoint payloads and the refresh call
//!
//! Login goes through the regular request pipeline, so only its payload type
//! lives here. Refresh is different: it is a single attempt sent straight to
//! the transport, never retried and never routed back into the refresh path
//! (a 401 from the refresh endpoint is terminal).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use transport::envelope::error_message;
use transport::header::AUTHORIZATION;
use transport::{
    Envelope, HeaderMap, Method, OutboundRequest, RequestBody, Transport, TransportError,
};

use crate::error::{Error, Result};

/// `data` of a successful login envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginTokens {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Body sent to the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    user_id: Option<&'a str>,
}

/// `data` of a successful refresh envelope.
///
/// Servers may or may not reissue the access token. When `token` is absent
/// the new refresh value doubles as the access token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    refresh_token: String,
    #[serde(default, alias = "accessToken")]
    token: Option<String>,
}

/// Token pair produced by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Exchange a refresh token for a new token pair. Exactly one attempt.
///
/// `headers` are the client's default headers; the refresh call carries them
/// like any other request, but never an `Authorization` header.
///
/// 401/403 or an envelope reporting failure means the refresh token is no
/// longer accepted (`RefreshRejected`). Anything else that is not a usable
/// success is `Refresh`.
pub async fn refresh_token(
    transport: &dyn Transport,
    url: &str,
    headers: &HeaderMap,
    refresh: &str,
    user_id: Option<&str>,
    timeout: Duration,
) -> Result<RefreshedTokens> {
    if refresh.is_empty() {
        return Err(Error::RefreshRejected("no refresh token stored".into()));
    }

    let body = serde_json::to_value(RefreshRequest {
        refresh_token: refresh,
        user_id,
    })
    .map_err(|e| Error::Refresh(format!("encoding refresh request: {e}")))?;

    let mut request = OutboundRequest::new(Method::POST, url, timeout);
    request.headers = headers.clone();
    request.headers.remove(AUTHORIZATION);
    request.body = Some(RequestBody::Json(body));

    let response = transport.send(&request).await.map_err(|e| match e {
        TransportError::Timeout(msg) => Error::Refresh(format!("refresh timed out: {msg}")),
        TransportError::Network(msg) => Error::Refresh(format!("refresh request failed: {msg}")),
    })?;

    let status = response.status;
    if status == 401 || status == 403 {
        let detail = error_message(&response.body).unwrap_or_else(|| response.body.clone());
        return Err(Error::RefreshRejected(format!(
            "refresh endpoint returned {status}: {detail}"
        )));
    }
    if !(200..300).contains(&status) {
        return Err(Error::Refresh(format!(
            "refresh endpoint returned {status}: {}",
            response.body
        )));
    }

    let envelope: Envelope<RefreshResponse> = Envelope::parse(&response.body)
        .map_err(|e| Error::Refresh(format!("invalid refresh response: {e}")))?;
    if !envelope.succeeded {
        return Err(Error::RefreshRejected(envelope.failure_message()));
    }
    let data = envelope
        .data
        .ok_or_else(|| Error::Refresh("refresh response carried no data".into()))?;
    if data.refresh_token.is_empty() {
        return Err(Error::Refresh("refresh response carried an empty token".into()));
    }

    let access_token = match data.token {
        Some(token) if !token.is_empty() => token,
        _ => data.refresh_token.clone(),
    };
    debug!(reissued_access = access_token != data.refresh_token, "refresh succeeded");

    Ok(RefreshedTokens {
        access_token,
        refresh_token: data.refresh_token,
    })
}
