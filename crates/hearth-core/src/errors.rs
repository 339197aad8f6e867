//! Core error type shared across Hearth crates.

use thiserror::Error;

/// Errors raised by the core seams.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Interpreter evaluation failed.
    #[error("evaluation failed: {message}")]
    Evaluation {
        /// Interpreter-provided description.
        message: String,
    },

    /// Evaluation was interrupted before completion.
    #[error("evaluation interrupted")]
    Interrupted,

    /// Serializing interpreter state for suspension failed.
    #[error("state serialization failed: {message}")]
    Serialization {
        /// What went wrong.
        message: String,
    },
}
