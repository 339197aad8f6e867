//! Shared fixtures for the crate's tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use hearth_core::{CoreError, SessionControl, SuspendHandler, SuspendSignals};
use hearth_rpc::{handlers, HandlerCx, MethodRegistry};
use hearth_settings::HearthSettings;

use crate::connection::{Connection, HttpRequest, HttpResponse};
use crate::context::SessionContext;
use crate::router::Router;

/// `SessionControl` that records quit calls instead of exiting.
#[derive(Debug, Default)]
pub struct RecordingControl {
    quits: Mutex<Vec<i32>>,
}

impl RecordingControl {
    /// Recorded quit statuses, in call order.
    pub fn quits(&self) -> Vec<i32> {
        self.quits.lock().clone()
    }
}

impl SessionControl for RecordingControl {
    fn initiate_quit(&self, status: i32) {
        self.quits.lock().push(status);
    }
}

/// `SuspendHandler` that records attempts and reports success without
/// exiting.
#[derive(Debug, Default)]
pub struct RecordingSuspendHandler {
    attempts: Mutex<Vec<bool>>,
}

impl RecordingSuspendHandler {
    /// Recorded `force` flags, in call order.
    pub fn attempts(&self) -> Vec<bool> {
        self.attempts.lock().clone()
    }
}

impl SuspendHandler for RecordingSuspendHandler {
    fn suspend(&self, force: bool) -> Result<(), CoreError> {
        self.attempts.lock().push(force);
        Ok(())
    }
}

/// Build a connection plus the receiver its response lands on.
pub fn make_connection(uri: &str, body: &str) -> (Connection, oneshot::Receiver<HttpResponse>) {
    let (tx, rx) = oneshot::channel();
    (Connection::new(HttpRequest::post(uri, body), tx), rx)
}

/// Receive a JSON response body, panicking if none was written.
pub fn recv_json(rx: oneshot::Receiver<HttpResponse>) -> Value {
    let response = rx.blocking_recv().expect("a response was written");
    serde_json::from_str(&response.body).expect("response body is JSON")
}

/// A standalone router over fresh state, for router-level tests.
pub struct RouterFixture {
    /// The router under test.
    pub router: Router,
    /// The shared handler state it executes against.
    pub cx: HandlerCx,
    /// Records quit calls.
    pub control: Arc<RecordingControl>,
    /// Suspend request flags.
    pub signals: Arc<SuspendSignals>,
}

/// Build a [`RouterFixture`], letting the test add handlers first.
pub fn make_router_fixture(configure: impl FnOnce(&mut MethodRegistry)) -> RouterFixture {
    let mut registry = MethodRegistry::new();
    handlers::register_builtin(&mut registry);
    configure(&mut registry);

    let cx = HandlerCx {
        events: Arc::new(hearth_events::EventQueue::new()),
        exec: Arc::new(hearth_core::ExecutionState::new()),
        console: Arc::new(hearth_core::ConsoleInputBuffer::new()),
        identity: Arc::new(hearth_core::ClientIdentity::new()),
    };
    let control = Arc::new(RecordingControl::default());
    let signals = Arc::new(SuspendSignals::new());
    let router = Router::new(
        Arc::new(registry),
        cx.clone(),
        Arc::clone(&control) as Arc<dyn SessionControl>,
        Arc::clone(&signals),
    );
    RouterFixture { router, cx, control, signals }
}

/// A fully wired session context with recording seams and built-in
/// handlers, for dispatch/service-level tests.
pub fn make_context() -> Arc<SessionContext> {
    make_context_with(HearthSettings::default(), |_| {})
}

/// [`make_context`] with custom settings and extra handlers.
pub fn make_context_with(
    settings: HearthSettings,
    configure: impl FnOnce(&mut MethodRegistry),
) -> Arc<SessionContext> {
    let mut registry = MethodRegistry::new();
    handlers::register_builtin(&mut registry);
    configure(&mut registry);
    SessionContext::new(
        settings,
        registry,
        Arc::new(RecordingControl::default()),
        Arc::new(RecordingSuspendHandler::default()),
    )
}
