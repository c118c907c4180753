//! Authenticated request pipeline
//!
//! `SessionClient::execute` runs every request through the same stages:
//! attach the stored credential, send one attempt, classify the outcome,
//! recover from a 401 through the refresh coordinator, and retry transient
//! failures with exponential backoff.
//!
//! A request refreshes at most once. After a refresh its retry carries the
//! new token, and a second 401 is returned to the caller as an auth failure
//! instead of starting another refresh.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use session_auth::{
    Credential, CredentialStore, DETAIL_PATH, Identity, LOGIN_PATH, LOGOUT_PATH, LoginTokens,
    REFRESH_PATH, join_url, refresh_token,
};
use tracing::{Instrument, debug, info, instrument, warn};
use transport::envelope::error_message;
use transport::header::{AUTHORIZATION, HeaderName, HeaderValue};
use transport::{
    AttemptOutcome, Envelope, ErrorKind, HeaderMap, Method, MultipartForm, OutboundRequest,
    RequestBody, Transport, classify,
};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::coordinator::{LeaderGuard, RefreshCoordinator, RefreshFailure, RefreshOutcome, Role};
use crate::error::{Error, Result};
use crate::metrics::{record_refresh, record_request, record_retry};
use crate::observer::{NoopObserver, SessionObserver};

/// A request as the application describes it. `path` is relative to the
/// configured base URL (absolute URLs are sent as-is).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Route a 401 through the refresh coordinator. Off for endpoints where
    /// a 401 means bad input rather than a stale session (login, logout).
    pub refresh_on_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            refresh_on_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Send `form` as `multipart/form-data`.
    pub fn with_form(mut self, form: MultipartForm) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_auth = false;
        self
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub credential: Credential,
    /// `None` when the detail endpoint could not be read; the session is
    /// still usable.
    pub identity: Option<Identity>,
}

/// HTTP client that keeps a session alive across expiring access tokens.
///
/// Cheap to clone; clones share the store, the transport and the refresh
/// coordinator, so concurrent requests from any clone refresh at most once.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    observer: Arc<dyn SessionObserver>,
    config: Arc<ClientConfig>,
}

impl SessionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator: RefreshCoordinator::new(),
            observer: Arc::new(NoopObserver),
            config: Arc::new(config),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and return the envelope's `data` (`Null` when absent).
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), method = %request.method, path = %request.path)
    )]
    pub async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let result = self.run(&request).await;
        match &result {
            Ok(_) => record_request("ok"),
            Err(e) => {
                record_request(e.label());
                match e {
                    Error::Business(message) => self.observer.on_business_failure(message),
                    // Reported once per refresh cycle by the leader
                    Error::SessionExpired(_) => {}
                    other => self.observer.on_request_failed(other),
                }
            }
        }
        result
    }

    /// `execute`, decoding `data` into `T`.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let data = self.execute(request).await?;
        decode_data(data)
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = query
            .iter()
            .fold(ApiRequest::get(path), |req, (k, v)| req.with_query(*k, *v));
        self.execute(request).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(ApiRequest::post(path, body)).await
    }

    pub async fn delete(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = ApiRequest::delete(path);
        request.body = body.map(RequestBody::Json);
        self.execute(request).await
    }

    /// POST a multipart form and return `data` (typically the stored file's URL).
    pub async fn upload_file(&self, path: &str, form: MultipartForm) -> Result<Value> {
        if form.is_empty() {
            return Err(Error::InvalidRequest("upload form has no parts".into()));
        }
        self.execute(ApiRequest::new(Method::POST, path).with_form(form)).await
    }

    /// Exchange account and password for a session, then load the identity.
    pub async fn login(&self, account: &str, password: &str) -> Result<LoginOutcome> {
        if account.trim().is_empty() || password.is_empty() {
            return Err(Error::InvalidRequest(
                "account and password are required".into(),
            ));
        }

        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({"account": account, "password": password}),
        )
        .without_refresh();
        let tokens: LoginTokens = self.execute_as(request).await?;

        let refresh = tokens.refresh_token.as_deref().unwrap_or_default();
        let credential = self.store.save(&tokens.token, refresh).await?;

        let identity = match self.refresh_identity().await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "logged in but failed to load user detail");
                None
            }
        };

        info!(user_id = identity.as_ref().map(|i| i.id.as_str()), "logged in");
        Ok(LoginOutcome {
            credential,
            identity,
        })
    }

    /// Best-effort server logout; local state is cleared regardless.
    pub async fn logout(&self) -> Result<()> {
        if self.store.load().await.is_some() {
            let request = ApiRequest::new(Method::POST, LOGOUT_PATH).without_refresh();
            if let Err(e) = self.run(&request).await {
                warn!(error = %e, "server logout failed, clearing local session anyway");
            }
        }
        self.store.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Stored credential, if present and unexpired.
    pub async fn current_credential(&self) -> Option<Credential> {
        self.store.load().await
    }

    /// Stored identity, without contacting the server.
    pub async fn current_identity(&self) -> Option<Identity> {
        self.store.identity().await
    }

    /// Fetch the user detail from the server and store it.
    pub async fn refresh_identity(&self) -> Result<Identity> {
        let identity: Identity = self.execute_as(ApiRequest::get(DETAIL_PATH)).await?;
        let identity = self
            .store
            .save_identity(Identity {
                is_authenticated: true,
                ..identity
            })
            .await?;
        Ok(identity)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.store.is_logged_in().await
    }

    async fn run(&self, request: &ApiRequest) -> Result<Value> {
        let url = join_url(&self.config.base_url, &request.path);
        let policy = &self.config.retry;
        let mut attempt: u32 = 0;
        let mut refreshed = false;
        let mut token_override: Option<String> = None;

        loop {
            let outbound = self
                .attach_credential(request, &url, token_override.take())
                .await?;
            let outcome = self.transport.send(&outbound).await;

            let Some(kind) = classify(&outcome) else {
                let body = outcome.map(|r| r.body).unwrap_or_default();
                return decode_success(&body);
            };
            let error = request_error(kind, &outcome);
            debug!(kind = %kind, status = ?error.status(), attempt, "attempt failed");

            if kind == ErrorKind::Auth && request.refresh_on_auth && !refreshed {
                refreshed = true;
                let token = self.recover_auth(outbound.bearer_token()).await?;
                token_override = Some(token);
                continue;
            }

            if policy.should_retry(kind, attempt) {
                let delay = policy.backoff_delay(attempt);
                record_retry(kind.label());
                warn!(
                    kind = %kind,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(error);
        }
    }

    /// Build one attempt. `token` overrides the stored credential.
    async fn attach_credential(
        &self,
        request: &ApiRequest,
        url: &str,
        token: Option<String>,
    ) -> Result<OutboundRequest> {
        let mut outbound =
            OutboundRequest::new(request.method.clone(), url, self.config.timeout);
        outbound.headers = self.config.default_headers.clone();
        for (name, value) in &request.headers {
            outbound.headers.insert(name.clone(), value.clone());
        }
        outbound.query = request.query.clone();
        outbound.body = request.body.clone();

        let token = match token {
            Some(token) => Some(token),
            None => self.store.load().await.map(|c| c.access_token),
        };
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                Error::InvalidCredential("access token is not a valid header value".into())
            })?;
            value.set_sensitive(true);
            outbound.headers.insert(AUTHORIZATION, value);
        }
        Ok(outbound)
    }

    /// Obtain a usable access token after a 401 carrying `sent`.
    async fn recover_auth(&self, sent: Option<&str>) -> Result<String> {
        if let Some(current) = self.store.load().await {
            if sent != Some(current.access_token.as_str()) {
                debug!("credential changed since the request was sent, reusing it");
                record_refresh("reused");
                return Ok(current.access_token);
            }
        }

        let outcome = match self.coordinator.try_become_leader() {
            Role::Leader(guard) => {
                // Spawned so that cancelling this request cannot strand the waiters
                let leader = self.clone();
                let sent = sent.map(str::to_string);
                let task = tokio::spawn(
                    async move { leader.refresh_as_leader(guard, sent).await }
                        .instrument(tracing::Span::current()),
                );
                match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(RefreshFailure::Rejected(format!("refresh task failed: {e}"))),
                }
            }
            Role::Waiter(handle) => {
                debug!(waiter = handle.id(), "refresh in flight, waiting");
                handle.wait().await
            }
        };

        outcome.map_err(|failure| Error::SessionExpired(failure.to_string()))
    }

    /// Run one refresh cycle and publish the outcome to every waiter.
    ///
    /// The store is updated (or cleared) before waiters are released, so a
    /// 401 that lands after release sees the new state.
    async fn refresh_as_leader(self, guard: LeaderGuard, sent: Option<String>) -> RefreshOutcome {
        let outcome = self.perform_refresh(sent.as_deref()).await;

        if let Err(failure) = &outcome {
            record_refresh("failure");
            warn!(error = %failure, "refresh failed, clearing session");
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "failed to clear session after refresh failure");
            }
        }

        let released = guard.release(outcome.clone());
        debug!(waiters = released.len(), "released refresh waiters");

        if let Err(failure) = &outcome {
            self.observer.on_session_expired(&failure.to_string());
        }
        outcome
    }

    async fn perform_refresh(&self, sent: Option<&str>) -> RefreshOutcome {
        let Some(current) = self.store.load().await else {
            return Err(RefreshFailure::Rejected(
                "no stored credential to refresh".into(),
            ));
        };
        if sent != Some(current.access_token.as_str()) {
            record_refresh("reused");
            return Ok(current.access_token);
        }

        let user_id = self.store.identity().await.map(|identity| identity.id);
        let url = join_url(&self.config.base_url, REFRESH_PATH);
        let tokens = refresh_token(
            self.transport.as_ref(),
            &url,
            &self.config.default_headers,
            &current.refresh_token,
            user_id.as_deref(),
            self.config.timeout,
        )
        .await
        .map_err(|e| RefreshFailure::Rejected(e.to_string()))?;

        let saved = self
            .store
            .save(&tokens.access_token, &tokens.refresh_token)
            .await
            .map_err(|e| RefreshFailure::Rejected(format!("storing refreshed credential: {e}")))?;

        record_refresh("success");
        info!(expires_at = saved.expires_at, "session refreshed");
        Ok(saved.access_token)
    }
}

/// Build the error for a failed attempt.
fn request_error(kind: ErrorKind, outcome: &AttemptOutcome) -> Error {
    match outcome {
        Ok(response) => Error::Request {
            kind,
            status: Some(response.status),
            message: error_message(&response.body)
                .unwrap_or_else(|| default_message(response.status)),
        },
        Err(e) => Error::Request {
            kind,
            status: None,
            message: e.to_string(),
        },
    }
}

/// Message used when the server did not provide one.
fn default_message(status: u16) -> String {
    let message = match status {
        400 => "bad request parameters",
        401 => "unauthorized, please log in again",
        403 => "no permission for this resource",
        404 => "resource not found",
        500 => "server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        other => return format!("request failed with status {other}"),
    };
    message.to_string()
}

/// Unwrap a 2xx envelope.
fn decode_success(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let envelope: Envelope = Envelope::parse(body).map_err(|e| Error::Request {
        kind: ErrorKind::Unknown,
        status: None,
        message: format!("malformed response envelope: {e}"),
    })?;
    if !envelope.succeeded {
        return Err(Error::Business(envelope.failure_message()));
    }
    Ok(envelope.data.unwrap_or(Value::Null))
}

fn decode_data<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Request {
        kind: ErrorKind::Unknown,
        status: None,
        message: format!("unexpected response data: {e}"),
    })
}
