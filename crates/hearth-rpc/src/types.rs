//! RPC wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hearth_events::ClientEvent;

use crate::errors::{RpcError, RpcErrorBody};

/// URI prefix that marks a connection as an RPC request.
pub const RPC_URI_PREFIX: &str = "/rpc/";

/// Reserved method: exit the process.
pub const QUIT_SESSION: &str = "quit_session";
/// Reserved method: request suspension (`force` parameter).
pub const SUSPEND_SESSION: &str = "suspend_session";
/// Reserved method: interrupt the interpreter.
pub const INTERRUPT: &str = "interrupt";
/// Special-cased method: client (re-)initialization.
pub const CLIENT_INIT: &str = "client_init";

/// Upper bound on positional parameters; longer lists are rejected as
/// oversized rather than handed to handlers.
pub const MAX_PARAMS: usize = 128;

/// Extract the method name from an RPC URI (`/rpc/foo` → `foo`).
pub fn method_from_uri(uri: &str) -> Option<&str> {
    let method = uri.strip_prefix(RPC_URI_PREFIX)?;
    (!method.is_empty()).then_some(method)
}

/// Incoming RPC request envelope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcRequest {
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Keyword parameters.
    pub kwparams: Map<String, Value>,
    /// Id of the client that sent the request.
    pub client_id: String,
    /// Client build version string (empty when the client predates it).
    pub client_version: String,
    /// Legacy numeric protocol version (`0` when absent).
    pub version: f64,
    /// Whether the request arrived on a background connection. Never on
    /// the wire; set by the dispatcher.
    #[serde(skip)]
    pub background: bool,
}

impl RpcRequest {
    /// Parse a request body, filling `method` from `uri` when the body
    /// omits it.
    pub fn parse(uri: &str, body: &str) -> Result<Self, RpcError> {
        let mut request: Self = serde_json::from_str(body).map_err(|e| {
            RpcError::InvalidRequest { message: format!("malformed request body: {e}") }
        })?;
        if request.method.is_empty() {
            request.method = method_from_uri(uri).unwrap_or_default().to_string();
        }
        if request.method.is_empty() {
            return Err(RpcError::InvalidRequest {
                message: "request has no method".into(),
            });
        }
        if request.params.len() > MAX_PARAMS {
            return Err(RpcError::invalid_params(format!(
                "too many parameters: {} (max {MAX_PARAMS})",
                request.params.len()
            )));
        }
        Ok(request)
    }

    /// Positional parameter by index.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }

    /// Keyword parameter by name.
    pub fn kwparam(&self, name: &str) -> Option<&Value> {
        self.kwparams.get(name)
    }
}

/// Outgoing RPC response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcResponse {
    /// Result payload (present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    /// Whether client events are waiting to be long-polled.
    pub events_pending: bool,
    /// Handle for asynchronous completion (present on async acks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_handle: Option<String>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn result(value: Value) -> Self {
        Self { result: Some(value), ..Self::default() }
    }

    /// Build an error response.
    pub fn error(error: &RpcError) -> Self {
        Self { error: Some(error.to_error_body()), ..Self::default() }
    }

    /// Build an asynchronous acknowledgement.
    pub fn async_ack(handle: impl Into<String>) -> Self {
        Self { async_handle: Some(handle.into()), ..Self::default() }
    }

    /// Set the events-pending hint.
    #[must_use]
    pub fn with_events_pending(mut self, pending: bool) -> Self {
        self.events_pending = pending;
        self
    }
}

/// Long-poll request body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventsRequest {
    /// Id of the client polling for events.
    pub client_id: String,
    /// Highest event id the client has already received (`0` for none).
    pub last_event_id_seen: i64,
}

/// Long-poll response body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventsResponse {
    /// Events in delivery order, each carrying its assigned id.
    pub events: Vec<ClientEvent>,
    /// Whether more events arrived after this batch was cut.
    pub events_pending: bool,
}
