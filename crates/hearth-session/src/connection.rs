//! Inbound connections and their write-once response sinks.
//!
//! A [`Connection`] is owned exclusively by whichever component currently
//! holds it; ownership transfers atomically when it is pushed onto a
//! queue or promoted to the async path. It is terminal after exactly one
//! response or hand-off: the sink is consumed on first use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use uuid::Uuid;

use hearth_events::{ClientEvent, EventQueue};
use hearth_rpc::{RpcError, RpcRequest, RpcResponse};

use crate::errors::SessionError;

/// The parts of an HTTP request the dispatch core needs.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP verb.
    pub method: String,
    /// Request URI (path only).
    pub uri: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: String,
}

impl HttpRequest {
    /// Build a POST request with an empty header set.
    pub fn post(uri: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".into(),
            uri: uri.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }
}

/// The response written back to the listener.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type header value.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// A `200` JSON response.
    pub fn json<T: Serialize>(value: &T) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: serde_json::to_string(value).unwrap_or_else(|_| "null".into()),
        }
    }

    /// A `404` for an unroutable URI.
    pub fn not_found(uri: &str) -> Self {
        Self {
            status: 404,
            content_type: "application/json",
            body: serde_json::to_string(&json!({ "error": format!("not found: {uri}") }))
                .unwrap_or_default(),
        }
    }
}

enum ResponseSink {
    /// Direct channel back to the waiting listener task.
    Http(oneshot::Sender<HttpResponse>),
    /// Promoted: the client already holds `handle`; the response is
    /// delivered as an async-completion event.
    Event {
        handle: String,
        events: Arc<EventQueue>,
    },
}

/// An inbound connection: the request plus a write-once response sink.
pub struct Connection {
    request: HttpRequest,
    sink: Option<ResponseSink>,
    received_at: Instant,
    parsed: Option<RpcRequest>,
}

impl Connection {
    /// Wrap a request and its response channel.
    pub fn new(request: HttpRequest, response_tx: oneshot::Sender<HttpResponse>) -> Self {
        Self {
            request,
            sink: Some(ResponseSink::Http(response_tx)),
            received_at: Instant::now(),
            parsed: None,
        }
    }

    /// The underlying request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Request URI.
    pub fn uri(&self) -> &str {
        &self.request.uri
    }

    /// Request body.
    pub fn body(&self) -> &str {
        &self.request.body
    }

    /// When the listener received this connection.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// How long this connection has been waiting.
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Whether this connection was already acknowledged and now completes
    /// through the async path.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self.sink, Some(ResponseSink::Event { .. }))
    }

    /// The async handle the client was acked with, if promoted.
    pub fn async_handle(&self) -> Option<&str> {
        match &self.sink {
            Some(ResponseSink::Event { handle, .. }) => Some(handle),
            _ => None,
        }
    }

    /// The request parsed at promotion time, if any.
    pub fn take_parsed(&mut self) -> Option<RpcRequest> {
        self.parsed.take()
    }

    /// Write the one HTTP response this connection gets.
    pub fn send_response(&mut self, response: HttpResponse) -> Result<(), SessionError> {
        match self.sink.take() {
            Some(ResponseSink::Http(tx)) => {
                tx.send(response).map_err(|_| SessionError::ConnectionClosed)
            }
            Some(ResponseSink::Event { handle, events }) => {
                // a raw HTTP response cannot reach a promoted client; put
                // the sink back and refuse
                self.sink = Some(ResponseSink::Event { handle, events });
                Err(SessionError::AlreadyResponded)
            }
            None => Err(SessionError::AlreadyResponded),
        }
    }

    /// Complete this connection with an RPC response, through whichever
    /// path it is bound to: the HTTP channel, or an async-completion
    /// event for promoted connections.
    pub fn send_rpc_response(&mut self, response: RpcResponse) -> Result<(), SessionError> {
        match self.sink.take() {
            Some(ResponseSink::Http(tx)) => tx
                .send(HttpResponse::json(&response))
                .map_err(|_| SessionError::ConnectionClosed),
            Some(ResponseSink::Event { handle, events }) => {
                let body = serde_json::to_value(&response)
                    .unwrap_or(serde_json::Value::Null);
                events.add(ClientEvent::async_completion(&handle, body));
                Ok(())
            }
            None => Err(SessionError::AlreadyResponded),
        }
    }

    /// Complete this connection with an error response.
    pub fn send_rpc_error(&mut self, error: &RpcError) -> Result<(), SessionError> {
        self.send_rpc_response(RpcResponse::error(error))
    }

    /// Promote to async completion: acknowledge the waiting client with a
    /// generated handle, then return the lightweight async variant
    /// carrying the already-parsed request.
    ///
    /// The caller is unblocked immediately; the eventual result arrives
    /// as an async-completion event.
    pub fn promote_to_async(
        mut self,
        events: &Arc<EventQueue>,
        parsed: RpcRequest,
    ) -> Result<Self, SessionError> {
        let handle = Uuid::now_v7().to_string();
        self.send_rpc_response(RpcResponse::async_ack(&handle))?;
        Ok(Self {
            request: self.request,
            sink: Some(ResponseSink::Event {
                handle,
                events: Arc::clone(events),
            }),
            received_at: self.received_at,
            parsed: Some(parsed),
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.request.uri)
            .field("acknowledged", &self.is_acknowledged())
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}
