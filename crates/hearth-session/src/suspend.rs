//! The suspend/resume state machine.
//!
//! Decides when the session process may be evicted from memory. Normal
//! (timeout or cooperative) suspension only proceeds while the
//! blocking-op set is empty; forced suspension bypasses the set entirely,
//! interrupting a busy interpreter first. Suspend contention is not an
//! error: it defers to [`SuspendMode::AwaitingInactivity`], notifies the
//! client once per distinct op set, and logs a single warning when the
//! original deadline passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use hearth_core::{ExecutionState, SuspendHandler, SuspendSignals};
use hearth_events::{ClientEvent, EventQueue};

use crate::blocking::BlockingOps;

/// Which kind of deadline the controller is currently waiting on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendMode {
    /// Counting down the idle deadline.
    AwaitingTimeout,
    /// The deadline fired (or suspension was requested) while blocking
    /// ops were registered; waiting for them to clear.
    AwaitingInactivity,
}

#[derive(Debug)]
struct State {
    mode: SuspendMode,
    deadline: Option<Instant>,
    original_deadline: Option<Instant>,
    blocked_since: Option<Instant>,
    notified_ops: Option<Vec<String>>,
    warned: bool,
}

/// Drives cooperative, forced, and idle-timeout eviction.
pub struct SuspendController {
    signals: Arc<SuspendSignals>,
    ops: Arc<BlockingOps>,
    handler: Arc<dyn SuspendHandler>,
    exec: Arc<ExecutionState>,
    events: Arc<EventQueue>,
    idle_timeout: Option<Duration>,
    notify_delay: Duration,
    state: Mutex<State>,
}

impl SuspendController {
    /// Create a controller. `idle_timeout` of `None` disables the idle
    /// deadline entirely.
    pub fn new(
        signals: Arc<SuspendSignals>,
        ops: Arc<BlockingOps>,
        handler: Arc<dyn SuspendHandler>,
        exec: Arc<ExecutionState>,
        events: Arc<EventQueue>,
        idle_timeout: Option<Duration>,
        notify_delay: Duration,
    ) -> Self {
        let deadline = idle_timeout.map(|t| Instant::now() + t);
        Self {
            signals,
            ops,
            handler,
            exec,
            events,
            idle_timeout,
            notify_delay,
            state: Mutex::new(State {
                mode: SuspendMode::AwaitingTimeout,
                deadline,
                original_deadline: None,
                blocked_since: None,
                notified_ops: None,
                warned: false,
            }),
        }
    }

    /// The blocking-op set this controller consults.
    pub fn ops(&self) -> &Arc<BlockingOps> {
        &self.ops
    }

    /// Current mode.
    pub fn mode(&self) -> SuspendMode {
        self.state.lock().mode
    }

    /// Push the idle deadline out; called on every client-visible
    /// activity.
    pub fn record_activity(&self) {
        let mut state = self.state.lock();
        state.deadline = self.idle_timeout.map(|t| Instant::now() + t);
    }

    /// One controller step, run every dispatch-loop iteration.
    ///
    /// `allow_suspend` is the caller's safe-point predicate;
    /// `disconnected` reports an externally-computed timeout (the
    /// disconnected-client check) as deadline pressure. Returns whether a
    /// suspension completed — in production the process has exited before
    /// this returns `true`, so the value is observable only with test
    /// handlers.
    pub fn poll(&self, allow_suspend: &dyn Fn() -> bool, disconnected: bool) -> bool {
        // forced: bypass blocking ops, interrupt a busy interpreter
        if self.signals.forced_requested() {
            if self.exec.is_executing() {
                self.exec.set_interrupt_pending(true);
            }
            return self.attempt(true);
        }

        // cooperative: only at a safe point with nothing blocking
        if self.signals.cooperative_requested() {
            if self.ops.is_empty() && allow_suspend() {
                return self.attempt(false);
            }
            if !self.ops.is_empty() {
                self.enter_awaiting_inactivity();
            }
        }

        self.poll_timeout(allow_suspend, disconnected)
    }

    fn poll_timeout(&self, allow_suspend: &dyn Fn() -> bool, disconnected: bool) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.mode {
            SuspendMode::AwaitingTimeout => {
                let deadline_passed =
                    disconnected || state.deadline.is_some_and(|d| now >= d);
                if !deadline_passed {
                    return false;
                }
                if self.ops.is_empty() && allow_suspend() {
                    drop(state);
                    self.signals.set_from_timeout(true);
                    if self.attempt(false) {
                        return true;
                    }
                    // failed: clear the record and back off a full
                    // timeout period instead of hammering the failure
                    self.signals.set_from_timeout(false);
                    self.record_activity();
                    return false;
                }
                debug!(ops = ?self.ops.snapshot(), "idle deadline passed with blocking ops");
                Self::transition_to_inactivity(&mut state, now);
                false
            }
            SuspendMode::AwaitingInactivity => {
                if self.ops.is_empty() {
                    state.mode = SuspendMode::AwaitingTimeout;
                    state.deadline = self.idle_timeout.map(|t| now + t);
                    state.original_deadline = None;
                    state.blocked_since = None;
                    state.notified_ops = None;
                    state.warned = false;
                    return false;
                }
                if state
                    .blocked_since
                    .is_some_and(|t| now >= t + self.notify_delay)
                {
                    let snapshot = self.ops.snapshot();
                    if state.notified_ops.as_ref() != Some(&snapshot) {
                        self.events.add(ClientEvent::suspend_blocked(&snapshot));
                        state.notified_ops = Some(snapshot);
                    }
                }
                if !state.warned && state.original_deadline.is_some_and(|d| now >= d) {
                    warn!(
                        ops = ?self.ops.snapshot(),
                        "suspension deferred past its deadline by blocking operations"
                    );
                    state.warned = true;
                }
                false
            }
        }
    }

    fn enter_awaiting_inactivity(&self) {
        let mut state = self.state.lock();
        if state.mode == SuspendMode::AwaitingTimeout {
            Self::transition_to_inactivity(&mut state, Instant::now());
        }
    }

    fn transition_to_inactivity(state: &mut State, now: Instant) {
        state.original_deadline = state.deadline;
        state.mode = SuspendMode::AwaitingInactivity;
        state.blocked_since = Some(now);
        state.notified_ops = None;
        state.warned = false;
    }

    fn attempt(&self, force: bool) -> bool {
        match self.handler.suspend(force) {
            Ok(()) => {
                // production handlers exit before returning; reaching
                // here means a test handler observed the suspend
                info!(force, "session suspended");
                self.signals.clear_requests();
                self.signals.set_from_timeout(false);
                self.record_activity();
                true
            }
            Err(error) => {
                warn!(%error, force, "suspension failed, continuing");
                self.signals.clear_requests();
                false
            }
        }
    }
}
