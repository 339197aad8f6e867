//! Method registry: name → handler with completion mode and capability
//! markers.
//!
//! Handlers are tagged at registration time:
//!
//! - **Completion mode** — synchronous handlers return a value that is
//!   written directly; asynchronous handlers receive an [`AsyncHandle`]
//!   and deliver their result as a completion event later.
//! - **`OfflineSafe`** — whether the handler may run on a background
//!   thread without the interpreter. The offline service refuses to run
//!   anything not marked `OfflineSafe::Yes`, even if configuration
//!   allow-lists the method name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use hearth_core::{ClientIdentity, ConsoleInputBuffer, ExecutionState};
use hearth_events::EventQueue;

use crate::async_handle::AsyncHandle;
use crate::errors::RpcError;
use crate::types::RpcRequest;

/// How a handler's result reaches the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionMode {
    /// Result written to the connection before it is released.
    Synchronous,
    /// Connection acked immediately; result arrives as a completion event.
    Asynchronous,
}

/// Whether a handler may execute without the interpreter, from a
/// background thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfflineSafe {
    /// Touches nothing owned by the interpreter thread.
    Yes,
    /// Must run on the interpreter thread.
    No,
}

/// Shared state handlers may touch. Everything here is safe from any
/// thread; interpreter-owned state is deliberately absent.
#[derive(Clone)]
pub struct HandlerCx {
    /// Outbound event queue.
    pub events: Arc<EventQueue>,
    /// Interpreter busy / interrupt flags.
    pub exec: Arc<ExecutionState>,
    /// Buffered console input.
    pub console: Arc<ConsoleInputBuffer>,
    /// Active client identity.
    pub identity: Arc<ClientIdentity>,
}

/// A synchronous RPC handler.
pub trait RpcHandler: Send + Sync {
    /// Execute and return the result value.
    fn call(&self, request: &RpcRequest, cx: &HandlerCx) -> Result<Value, RpcError>;
}

impl<F> RpcHandler for F
where
    F: Fn(&RpcRequest, &HandlerCx) -> Result<Value, RpcError> + Send + Sync,
{
    fn call(&self, request: &RpcRequest, cx: &HandlerCx) -> Result<Value, RpcError> {
        self(request, cx)
    }
}

/// An asynchronous RPC handler. Must eventually complete (or drop) the
/// handle; dropping without completion delivers an internal error.
pub trait RpcHandlerAsync: Send + Sync {
    /// Begin execution; deliver the result through `completion`.
    fn call(&self, request: &RpcRequest, cx: &HandlerCx, completion: AsyncHandle);
}

impl<F> RpcHandlerAsync for F
where
    F: Fn(&RpcRequest, &HandlerCx, AsyncHandle) + Send + Sync,
{
    fn call(&self, request: &RpcRequest, cx: &HandlerCx, completion: AsyncHandle) {
        self(request, cx, completion);
    }
}

enum MethodHandler {
    Sync(Arc<dyn RpcHandler>),
    Async(Arc<dyn RpcHandlerAsync>),
}

/// A registered method.
pub struct MethodEntry {
    handler: MethodHandler,
    offline_safe: OfflineSafe,
}

impl MethodEntry {
    /// The handler's completion mode.
    pub fn mode(&self) -> CompletionMode {
        match self.handler {
            MethodHandler::Sync(_) => CompletionMode::Synchronous,
            MethodHandler::Async(_) => CompletionMode::Asynchronous,
        }
    }

    /// Whether the handler may run without the interpreter.
    pub fn offline_safe(&self) -> bool {
        self.offline_safe == OfflineSafe::Yes
    }

    /// Invoke a synchronous handler. Returns `None` for async entries.
    pub fn call_sync(
        &self,
        request: &RpcRequest,
        cx: &HandlerCx,
    ) -> Option<Result<Value, RpcError>> {
        match &self.handler {
            MethodHandler::Sync(h) => Some(h.call(request, cx)),
            MethodHandler::Async(_) => None,
        }
    }

    /// Invoke an asynchronous handler. Returns the handle back for sync
    /// entries so the caller can fall back.
    pub fn call_async(
        &self,
        request: &RpcRequest,
        cx: &HandlerCx,
        completion: AsyncHandle,
    ) -> Option<AsyncHandle> {
        match &self.handler {
            MethodHandler::Async(h) => {
                h.call(request, cx, completion);
                None
            }
            MethodHandler::Sync(_) => Some(completion),
        }
    }
}

/// Name → handler table.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler.
    pub fn register_sync(
        &mut self,
        name: impl Into<String>,
        offline_safe: OfflineSafe,
        handler: impl RpcHandler + 'static,
    ) {
        let _ = self.methods.insert(
            name.into(),
            MethodEntry {
                handler: MethodHandler::Sync(Arc::new(handler)),
                offline_safe,
            },
        );
    }

    /// Register an asynchronous handler.
    pub fn register_async(
        &mut self,
        name: impl Into<String>,
        offline_safe: OfflineSafe,
        handler: impl RpcHandlerAsync + 'static,
    ) {
        let _ = self.methods.insert(
            name.into(),
            MethodEntry {
                handler: MethodHandler::Async(Arc::new(handler)),
                offline_safe,
            },
        );
    }

    /// Look up a method by name.
    pub fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(name)
    }

    /// Whether a method is registered.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Whether a method is registered and marked offline-safe.
    pub fn is_offline_safe(&self, name: &str) -> bool {
        self.methods.get(name).is_some_and(MethodEntry::offline_safe)
    }

    /// Registered method names.
    pub fn methods(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}
