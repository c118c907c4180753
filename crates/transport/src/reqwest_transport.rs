//! reqwest-backed transport
//!
//! Sends exactly one attempt per call. Status codes are never turned into
//! errors here; only "no response at all" becomes a `TransportError`.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::{
    AttemptOutcome, OutboundRequest, RequestBody, Transport, TransportError, TransportResponse,
};

/// Production transport over a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send_once(&self, request: &OutboundRequest) -> AttemptOutcome {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match &request.body {
            Some(RequestBody::Json(body)) => builder = builder.json(body),
            Some(RequestBody::Multipart(form)) => {
                let form = form.to_reqwest().map_err(|e| {
                    TransportError::Network(format!("building multipart body: {e}"))
                })?;
                builder = builder.multipart(form);
            }
            None => {}
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_send_error)?;

        debug!(
            method = %request.method,
            url = %request.url,
            status,
            "received response"
        );
        Ok(TransportResponse { status, body })
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>> {
        Box::pin(self.send_once(request))
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}
