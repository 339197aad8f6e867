//! RPC error codes and error type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Error code constants ────────────────────────────────────────────

/// Request body was not a valid RPC envelope.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// Invalid, missing, or oversized parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Request carried a client id other than the active one.
pub const INVALID_CLIENT_ID: &str = "INVALID_CLIENT_ID";
/// Request came from a client built against a different server version.
pub const INVALID_CLIENT_VERSION: &str = "INVALID_CLIENT_VERSION";
/// Handler failed or panicked.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// The response channel was gone before the response could be written.
pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";

/// RPC error type returned by handlers and the router.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Body failed to parse as an RPC envelope.
    #[error("{message}")]
    InvalidRequest {
        /// What was wrong with the body.
        message: String,
    },

    /// Required parameter missing, wrong type, or parameter list oversized.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// No handler registered under the requested name.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The unknown method name.
        method: String,
    },

    /// Client id does not match the active client.
    #[error("invalid client id")]
    InvalidClientId,

    /// Client/server version mismatch; the client must reload.
    #[error("invalid client version")]
    InvalidClientVersion,

    /// Handler failure surfaced at the router boundary.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// The connection's response sink was dropped before completion.
    #[error("connection closed before response")]
    ConnectionClosed,
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidClientId => INVALID_CLIENT_ID,
            Self::InvalidClientVersion => INVALID_CLIENT_VERSION,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::ConnectionClosed => CONNECTION_CLOSED,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: None,
        }
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Shorthand for an invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams { message: message.into() }
    }
}

/// Structured error body inside an RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `METHOD_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_code() {
        let err = RpcError::invalid_params("bad");
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn method_not_found_names_method() {
        let err = RpcError::MethodNotFound { method: "nope".into() };
        assert_eq!(err.code(), METHOD_NOT_FOUND);
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn client_id_code() {
        assert_eq!(RpcError::InvalidClientId.code(), INVALID_CLIENT_ID);
    }

    #[test]
    fn client_version_code() {
        assert_eq!(
            RpcError::InvalidClientVersion.code(),
            INVALID_CLIENT_VERSION
        );
    }

    #[test]
    fn to_error_body_carries_code_and_message() {
        let body = RpcError::internal("boom").to_error_body();
        assert_eq!(body.code, INTERNAL_ERROR);
        assert_eq!(body.message, "boom");
        assert!(body.details.is_none());
    }

    #[test]
    fn error_body_serializes_without_null_details() {
        let body = RpcError::ConnectionClosed.to_error_body();
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("details"));
    }
}
