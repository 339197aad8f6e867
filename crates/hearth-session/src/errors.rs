//! Session error types.

use thiserror::Error;

/// Errors raised by the dispatch core.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection's response channel was gone before the response
    /// could be written (client went away).
    #[error("connection closed before response")]
    ConnectionClosed,

    /// A second response was attempted on a write-once connection.
    #[error("connection already responded")]
    AlreadyResponded,

    /// The session is shutting down; the wait cannot be satisfied.
    #[error("session is shutting down")]
    ShuttingDown,

    /// A background service thread failed to launch. Fatal at startup.
    #[error("failed to start {service} thread: {source}")]
    ServiceStart {
        /// Which service failed to start.
        service: &'static str,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_closed_display() {
        assert_eq!(
            SessionError::ConnectionClosed.to_string(),
            "connection closed before response"
        );
    }

    #[test]
    fn service_start_names_service() {
        let err = SessionError::ServiceStart {
            service: "event-service",
            source: std::io::Error::new(std::io::ErrorKind::Other, "no threads"),
        };
        assert!(err.to_string().contains("event-service"));
    }
}
