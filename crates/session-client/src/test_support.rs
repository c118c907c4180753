//! Scripted transport and recording observer for unit tests

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use transport::{AttemptOutcome, OutboundRequest, Transport, TransportError, TransportResponse};

use crate::error::Error;
use crate::observer::SessionObserver;

/// What the scripted server does with one request.
pub enum Scripted {
    Respond(u16, String),
    Delayed(Duration, u16, String),
    Fail(TransportError),
}

/// Successful envelope around `data`.
pub fn ok(data: Value) -> Scripted {
    Scripted::Respond(
        200,
        json!({"succeeded": true, "message": "", "data": data}).to_string(),
    )
}

pub fn status(code: u16) -> Scripted {
    Scripted::Respond(code, String::new())
}

type Handler = Box<dyn Fn(&OutboundRequest) -> Scripted + Send + Sync>;

/// Answers every request through a handler closure and records what was sent.
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&OutboundRequest) -> Scripted + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL ends with `path`.
    pub fn sent_to(&self, path: &str) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(path))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn id(&self) -> &str {
        "scripted"
    }

    fn send<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + 'a>> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = (self.handler)(request);
        Box::pin(async move {
            match scripted {
                Scripted::Respond(status, body) => Ok(TransportResponse { status, body }),
                Scripted::Delayed(delay, status, body) => {
                    tokio::time::sleep(delay).await;
                    Ok(TransportResponse { status, body })
                }
                Scripted::Fail(e) => Err(e),
            }
        })
    }
}

/// Observer event, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SessionExpired,
    RequestFailed(&'static str),
    BusinessFailure(String),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn expired_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::SessionExpired)
            .count()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_session_expired(&self, _reason: &str) {
        self.events.lock().unwrap().push(Event::SessionExpired);
    }

    fn on_request_failed(&self, error: &Error) {
        self.events
            .lock()
            .unwrap()
            .push(Event::RequestFailed(error.label()));
    }

    fn on_business_failure(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::BusinessFailure(message.to_string()));
    }
}
