//! Connection-level RPC routing.
//!
//! Decodes a connection into a request, screens the reserved methods
//! (quit / suspend / interrupt) that bypass the handler table, and
//! executes table handlers in one of three completion modes: synchronous,
//! asynchronous (handle-based), or promoted-to-async for connections that
//! were already acknowledged. Handler failures and panics are contained
//! here — the dispatch loop never sees them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use hearth_core::client::LEGACY_PROTOCOL_VERSION;
use hearth_core::{SessionControl, SuspendSignals};
use hearth_rpc::{
    AsyncHandle, HandlerCx, MethodEntry, MethodRegistry, RpcError, RpcRequest, RpcResponse,
    CompletionMode, INTERRUPT, QUIT_SESSION, RPC_URI_PREFIX, SUSPEND_SESSION,
};

use crate::connection::{Connection, HttpResponse};

/// Which thread class a connection is being dispatched from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    /// The interpreter thread, inside `wait_for_method`.
    Foreground,
    /// A background worker (busy-path pump or offline service).
    Background,
}

/// Routes decoded requests to reserved methods or the handler table.
pub struct Router {
    registry: Arc<MethodRegistry>,
    cx: HandlerCx,
    control: Arc<dyn SessionControl>,
    signals: Arc<SuspendSignals>,
}

impl Router {
    /// Create a router over the given registry and seams.
    pub fn new(
        registry: Arc<MethodRegistry>,
        cx: HandlerCx,
        control: Arc<dyn SessionControl>,
        signals: Arc<SuspendSignals>,
    ) -> Self {
        Self { registry, cx, control, signals }
    }

    /// Parse and validate a connection's body, answering it with a
    /// structured error (and returning `None`) on any protocol failure.
    pub fn parse_and_validate(&self, connection: &mut Connection) -> Option<RpcRequest> {
        let request = match RpcRequest::parse(connection.uri(), connection.body()) {
            Ok(request) => request,
            Err(error) => {
                if let Err(send_error) = connection.send_rpc_error(&error) {
                    debug!(%send_error, "error response not delivered");
                }
                return None;
            }
        };
        if let Err(error) = self.validate(&request) {
            if let Err(send_error) = connection.send_rpc_error(&error) {
                debug!(%send_error, "error response not delivered");
            }
            return None;
        }
        Some(request)
    }

    fn validate(&self, request: &RpcRequest) -> Result<(), RpcError> {
        if !self.cx.identity.is_active(&request.client_id) {
            return Err(RpcError::InvalidClientId);
        }
        // any client still sending the legacy numeric version predates
        // this server
        if request.version > 0.0 && LEGACY_PROTOCOL_VERSION > request.version {
            return Err(RpcError::InvalidClientVersion);
        }
        if !self.cx.identity.version_matches(&request.client_version) {
            return Err(RpcError::InvalidClientVersion);
        }
        Ok(())
    }

    /// Answer a `client_init` request: rotate the active client id and
    /// report session state. Does not satisfy any pending wait.
    pub fn handle_client_init(&self, connection: &mut Connection) {
        let client_id = self.cx.identity.rotate();
        let response = RpcResponse::result(json!({
            "clientId": client_id,
            "clientVersion": self.cx.identity.client_version(),
            "busy": self.cx.exec.is_executing(),
        }))
        .with_events_pending(self.cx.events.has_events());
        if let Err(error) = connection.send_rpc_response(response) {
            debug!(%error, "client_init response not delivered");
        }
        info!(%client_id, "client initialized");
    }

    /// Route one connection to completion: decode, screen reserved
    /// methods, execute. Never panics and never fails the caller.
    pub fn route_connection(&self, mut connection: Connection, kind: ConnectionType) {
        let request = if let Some(parsed) = connection.take_parsed() {
            // promoted connections carry an already-parsed request
            if let Err(error) = self.validate(&parsed) {
                if let Err(send_error) = connection.send_rpc_error(&error) {
                    debug!(%send_error, "error response not delivered");
                }
                return;
            }
            parsed
        } else {
            if !connection.uri().starts_with(RPC_URI_PREFIX) {
                debug!(uri = connection.uri(), "no handler for uri");
                if let Err(error) =
                    connection.send_response(HttpResponse::not_found(connection.uri()))
                {
                    debug!(%error, "not-found response not delivered");
                }
                return;
            }
            match self.parse_and_validate(&mut connection) {
                Some(request) => request,
                None => return,
            }
        };

        let mut request = request;
        request.background = kind == ConnectionType::Background;
        self.route_request(request, connection);
    }

    fn route_request(&self, request: RpcRequest, connection: Connection) {
        match request.method.as_str() {
            QUIT_SESSION => self.handle_quit(&request, connection),
            SUSPEND_SESSION => self.handle_suspend(&request, connection),
            INTERRUPT => self.handle_interrupt(connection),
            _ => self.dispatch_table(request, connection),
        }
    }

    // ── Reserved methods (bypass the handler table) ─────────────────

    fn handle_quit(&self, request: &RpcRequest, mut connection: Connection) {
        let status = request
            .param(0)
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0) as i32;
        info!(status, "quit requested");
        if let Err(error) = connection.send_rpc_response(RpcResponse::result(json!(true))) {
            debug!(%error, "quit acknowledgement not delivered");
        }
        self.control.initiate_quit(status);
    }

    fn handle_suspend(&self, request: &RpcRequest, mut connection: Connection) {
        let force = request
            .param(0)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if let Err(error) = connection.send_rpc_response(RpcResponse::result(json!(true))) {
            debug!(%error, "suspend acknowledgement not delivered");
        }
        info!(force, "suspend requested");
        if force {
            self.signals.request_forced();
        } else {
            self.signals.request_cooperative();
        }
    }

    fn handle_interrupt(&self, mut connection: Connection) {
        let dropped = self.cx.console.clear();
        if dropped > 0 {
            debug!(dropped, "discarded buffered console input");
        }
        if let Err(error) = connection.send_rpc_response(RpcResponse::result(json!(true))) {
            debug!(%error, "interrupt acknowledgement not delivered");
        }
        // only meaningful while the interpreter is evaluating
        if self.cx.exec.is_executing() {
            self.cx.exec.set_interrupt_pending(true);
        }
    }

    // ── Table handlers ──────────────────────────────────────────────

    fn dispatch_table(&self, request: RpcRequest, mut connection: Connection) {
        let Some(entry) = self.registry.get(&request.method) else {
            // unknown methods indicate a client/server mismatch
            warn!(method = %request.method, "unknown rpc method");
            let error = RpcError::MethodNotFound { method: request.method.clone() };
            if let Err(send_error) = connection.send_rpc_error(&error) {
                debug!(%send_error, "error response not delivered");
            }
            return;
        };
        match entry.mode() {
            CompletionMode::Synchronous => self.execute_sync(entry, &request, connection),
            CompletionMode::Asynchronous => self.execute_async(entry, &request, connection),
        }
    }

    fn execute_sync(
        &self,
        entry: &MethodEntry,
        request: &RpcRequest,
        mut connection: Connection,
    ) {
        let outcome =
            catch_unwind(AssertUnwindSafe(|| entry.call_sync(request, &self.cx)));
        let result = match outcome {
            Ok(Some(result)) => result,
            Ok(None) => Err(RpcError::internal("handler mode mismatch")),
            Err(_) => {
                error!(method = %request.method, "rpc handler panicked");
                Err(RpcError::internal("handler panicked"))
            }
        };
        let response = match result {
            Ok(value) => RpcResponse::result(value),
            Err(error) => {
                warn!(method = %request.method, %error, "rpc handler failed");
                RpcResponse::error(&error)
            }
        };
        // promoted completions go out as events; only direct responses
        // carry the events-pending hint
        let response = if connection.is_acknowledged() {
            response
        } else {
            response.with_events_pending(self.cx.events.has_events())
        };
        if let Err(error) = connection.send_rpc_response(response) {
            debug!(method = %request.method, %error, "response not delivered");
        }
    }

    fn execute_async(
        &self,
        entry: &MethodEntry,
        request: &RpcRequest,
        mut connection: Connection,
    ) {
        let completion = if connection.is_acknowledged() {
            let Some(handle) = connection.async_handle().map(str::to_string) else {
                return;
            };
            AsyncHandle::with_id(handle, Arc::clone(&self.cx.events))
        } else {
            let completion = AsyncHandle::new(Arc::clone(&self.cx.events));
            let ack = RpcResponse::async_ack(completion.id());
            if let Err(error) = connection.send_rpc_response(ack) {
                // the client never saw the handle; a completion event
                // would be an orphan
                debug!(method = %request.method, %error, "async ack not delivered, dropping request");
                completion.discard();
                return;
            }
            completion
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            entry.call_async(request, &self.cx, completion)
        }));
        match outcome {
            Ok(Some(leftover)) => {
                leftover.complete(Err(RpcError::internal("handler mode mismatch")));
            }
            Ok(None) => {}
            Err(_) => {
                // the completion handle's drop already delivered an
                // abandonment error to the client
                error!(method = %request.method, "async rpc handler panicked");
            }
        }
    }
}
