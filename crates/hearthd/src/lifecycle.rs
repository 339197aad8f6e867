//! Process-lifecycle seam implementations: quitting and suspending
//! actually end this process.

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hearth_core::{CoreError, SessionControl, SuspendHandler};

/// Grace period for in-flight responses to flush before the process
/// exits on quit.
const QUIT_GRACE: Duration = Duration::from_millis(250);

/// Quit implementation: cancel the session's stop token, then exit.
#[derive(Default)]
pub struct ProcessControl {
    token: Mutex<Option<CancellationToken>>,
}

impl ProcessControl {
    /// Create an unbound control; [`Self::bind`] before serving.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the session's stop token once the context exists.
    pub fn bind(&self, token: CancellationToken) {
        *self.token.lock() = Some(token);
    }
}

impl SessionControl for ProcessControl {
    fn initiate_quit(&self, status: i32) {
        info!(status, "quitting session");
        if let Some(token) = self.token.lock().clone() {
            token.cancel();
        }
        let spawned = std::thread::Builder::new().name("quit".into()).spawn(move || {
            std::thread::sleep(QUIT_GRACE);
            std::process::exit(status);
        });
        if spawned.is_err() {
            std::process::exit(status);
        }
    }
}

/// Suspension implementation: serialize a session snapshot to disk, then
/// exit so the supervisor can relaunch on the next request.
pub struct FileSuspendHandler {
    state_path: PathBuf,
}

impl FileSuspendHandler {
    /// Snapshot to `state_path` on suspension.
    pub fn new(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    fn write_snapshot(&self, forced: bool) -> std::io::Result<()> {
        let snapshot = json!({
            "suspendedAt": chrono::Utc::now().to_rfc3339(),
            "pid": std::process::id(),
            "forced": forced,
        });
        std::fs::write(&self.state_path, snapshot.to_string())
    }
}

impl SuspendHandler for FileSuspendHandler {
    fn suspend(&self, force: bool) -> Result<(), CoreError> {
        if let Err(error) = self.write_snapshot(force) {
            if !force {
                return Err(CoreError::Serialization { message: error.to_string() });
            }
            // forced suspension proceeds without best-effort state
            warn!(%error, "state snapshot failed, forced suspend continues");
        }
        info!(force, path = %self.state_path.display(), "suspending session");
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_control_can_be_created() {
        let control = ProcessControl::new();
        control.bind(CancellationToken::new());
    }

    #[test]
    fn bind_replaces_token() {
        let control = ProcessControl::new();
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        control.bind(first);
        control.bind(second.clone());
        assert!(control.token.lock().is_some());
    }

    #[test]
    fn snapshot_failure_is_an_error_for_normal_suspend() {
        let handler =
            FileSuspendHandler::new(PathBuf::from("/nonexistent-dir/snapshot.json"));
        let result = handler.write_snapshot(false);
        assert!(result.is_err());
        // suspend(false) would surface this as CoreError::Serialization;
        // calling suspend() directly would exit the test process on the
        // success path, so only the snapshot step is exercised here
    }

    #[test]
    fn snapshot_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let handler = FileSuspendHandler::new(path.clone());
        handler.write_snapshot(true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["forced"], true);
        assert!(parsed["suspendedAt"].is_string());
    }
}
