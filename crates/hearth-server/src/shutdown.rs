//! Graceful shutdown coordination via `CancellationToken`.
//!
//! The token fans out to the axum accept loop and every background
//! service thread. Service threads are plain OS threads doing timed
//! waits, so draining polls `JoinHandle::is_finished` under a deadline
//! instead of awaiting task handles.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on threads.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How often to re-check a thread that has not finished yet.
const JOIN_POLL: Duration = Duration::from_millis(20);

/// Coordinates graceful shutdown across the listener and service threads.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// Create a coordinator over an existing token (the session context's
    /// process-wide stop signal).
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for every service
    /// thread to finish. Threads still running at the deadline are left
    /// behind with a warning; they only do timed waits and will observe
    /// the token on their next iteration.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<(&'static str, JoinHandle<()>)>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(
            thread_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for service threads to stop"
        );

        let deadline = Instant::now() + timeout;
        for (name, handle) in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(JOIN_POLL).await;
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(thread = name, "service thread panicked during shutdown");
                }
            } else {
                warn!(thread = name, "service thread still running at shutdown deadline");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
