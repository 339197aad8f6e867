//! Event error types.

use thiserror::Error;

/// Errors raised by the event layer.
#[derive(Debug, Error)]
pub enum EventError {
    /// An event arrived with a type code this server does not know.
    #[error("unknown event type code: {0}")]
    UnknownTypeCode(i32),
}
