//! # hearth-rpc
//!
//! RPC protocol layer: request/response wire types, error codes, the
//! method registry with per-handler completion modes and the offline-safe
//! capability marker, and the exactly-once async completion handle.
//!
//! Connection-level routing (reserved methods, completion-mode execution,
//! async promotion) lives in `hearth-session`; this crate is the protocol
//! vocabulary it routes with.

#![deny(unsafe_code)]

pub mod async_handle;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;

pub use async_handle::AsyncHandle;
pub use errors::{RpcError, RpcErrorBody};
pub use registry::{
    CompletionMode, HandlerCx, MethodEntry, MethodRegistry, OfflineSafe, RpcHandler,
    RpcHandlerAsync,
};
pub use types::{
    method_from_uri, GetEventsRequest, GetEventsResponse, RpcRequest, RpcResponse,
    CLIENT_INIT, INTERRUPT, QUIT_SESSION, RPC_URI_PREFIX, SUSPEND_SESSION,
};
