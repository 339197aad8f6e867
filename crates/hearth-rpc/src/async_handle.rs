//! Exactly-once async RPC completion.
//!
//! An [`AsyncHandle`] is handed to an asynchronous handler (or created
//! when a synchronous connection is promoted). Completing it appends an
//! async-completion event to the event queue. The handle is consumed by
//! value, so a handler cannot complete twice; a handle dropped without
//! completion (handler bug or panic) delivers an internal-error
//! completion so the client is never left waiting.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use hearth_events::{ClientEvent, EventQueue};

use crate::errors::RpcError;
use crate::types::RpcResponse;

/// Completion handle for an asynchronous RPC.
#[derive(Debug)]
pub struct AsyncHandle {
    id: String,
    events: Arc<EventQueue>,
    completed: bool,
}

impl AsyncHandle {
    /// Create a handle with a fresh id.
    pub fn new(events: Arc<EventQueue>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), events)
    }

    /// Create a handle with a caller-assigned id (used when the client was
    /// already acked with a handle, e.g. a promoted connection).
    pub fn with_id(id: impl Into<String>, events: Arc<EventQueue>) -> Self {
        Self {
            id: id.into(),
            events,
            completed: false,
        }
    }

    /// The opaque id the client correlates the completion event with.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deliver the completion event. Consumes the handle.
    pub fn complete(mut self, result: Result<Value, RpcError>) {
        let response = match result {
            Ok(value) => RpcResponse::result(value),
            Err(error) => RpcResponse::error(&error),
        };
        self.deliver(&response);
        self.completed = true;
    }

    /// Consume the handle without delivering anything. Only correct when
    /// the client never learned the handle id (e.g. the ack could not be
    /// written) — a completion event would be an orphan.
    pub fn discard(mut self) {
        self.completed = true;
    }

    fn deliver(&self, response: &RpcResponse) {
        match serde_json::to_value(response) {
            Ok(body) => {
                self.events.add(ClientEvent::async_completion(&self.id, body));
            }
            Err(e) => {
                warn!(handle = %self.id, error = %e, "failed to serialize async completion");
            }
        }
    }
}

impl Drop for AsyncHandle {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!(handle = %self.id, "async handle dropped without completion");
        let response = RpcResponse::error(&RpcError::internal(
            "async operation abandoned without a result",
        ));
        self.deliver(&response);
    }
}
