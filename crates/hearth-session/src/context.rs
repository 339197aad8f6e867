//! The session context: every component wired together once at startup.
//!
//! There are no ambient globals anywhere in the dispatch core. One
//! [`SessionContext`] is constructed at process start and threaded through
//! every component by `Arc`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hearth_core::{
    ClientIdentity, ConsoleInputBuffer, ExecutionState, SessionControl, SuspendHandler,
    SuspendSignals,
};
use hearth_events::EventQueue;
use hearth_rpc::{method_from_uri, HandlerCx, MethodRegistry};
use hearth_settings::HearthSettings;

use crate::blocking::BlockingOps;
use crate::connection_queue::ConnectionQueue;
use crate::router::Router;
use crate::suspend::SuspendController;

/// A deferred unit of work executed on the interpreter thread between
/// dispatch iterations.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Counts live child processes; any active child counts as session
/// activity and blocks the idle timeout from firing.
#[derive(Debug, Default)]
pub struct ChildTracker {
    active: AtomicUsize,
}

impl ChildTracker {
    /// Create with no children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track one child until the guard drops.
    pub fn track(self: &Arc<Self>) -> ChildGuard {
        let _ = self.active.fetch_add(1, Ordering::SeqCst);
        ChildGuard { tracker: Arc::clone(self) }
    }

    /// Whether any child is alive.
    pub fn has_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Number of live children.
    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// RAII guard for one tracked child process.
#[derive(Debug)]
pub struct ChildGuard {
    tracker: Arc<ChildTracker>,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything the dispatch core shares, constructed once at startup.
pub struct SessionContext {
    /// Loaded configuration.
    pub settings: HearthSettings,
    /// Ordinary RPC and general traffic.
    pub main_queue: Arc<ConnectionQueue>,
    /// Long-poll get-events traffic, kept separate so RPC floods cannot
    /// starve event delivery.
    pub events_queue: Arc<ConnectionQueue>,
    /// Outbound client events.
    pub events: Arc<EventQueue>,
    /// Registered RPC methods.
    pub registry: Arc<MethodRegistry>,
    /// Connection-level router.
    pub router: Router,
    /// Suspension state machine.
    pub suspend: Arc<SuspendController>,
    /// Signal-safe suspend request flags.
    pub signals: Arc<SuspendSignals>,
    /// Interpreter busy / interrupt flags.
    pub exec: Arc<ExecutionState>,
    /// Buffered console input.
    pub console: Arc<ConsoleInputBuffer>,
    /// Active client identity.
    pub identity: Arc<ClientIdentity>,
    /// Live child processes.
    pub children: Arc<ChildTracker>,
    /// Process-wide stop signal.
    pub shutdown: CancellationToken,

    wait_methods: RwLock<HashSet<String>>,
    completions: Mutex<Vec<Completion>>,
    long_poll_engaged: AtomicBool,
    pump_last: Mutex<Option<Instant>>,
}

impl SessionContext {
    /// Wire up a session from its settings, registry, and the two
    /// process-lifecycle seams.
    pub fn new(
        settings: HearthSettings,
        registry: MethodRegistry,
        control: Arc<dyn SessionControl>,
        suspend_handler: Arc<dyn SuspendHandler>,
    ) -> Arc<Self> {
        let events = Arc::new(EventQueue::new());
        let exec = Arc::new(ExecutionState::new());
        let console = Arc::new(ConsoleInputBuffer::new());
        let identity = Arc::new(ClientIdentity::new());
        let signals = Arc::new(SuspendSignals::new());
        let ops = Arc::new(BlockingOps::new());
        let registry = Arc::new(registry);

        let idle_timeout = (settings.dispatch.idle_timeout_minutes > 0)
            .then(|| Duration::from_secs(settings.dispatch.idle_timeout_minutes * 60));
        let suspend = Arc::new(SuspendController::new(
            Arc::clone(&signals),
            ops,
            suspend_handler,
            Arc::clone(&exec),
            Arc::clone(&events),
            idle_timeout,
            Duration::from_secs(settings.suspend.notify_delay_secs),
        ));

        let handler_cx = HandlerCx {
            events: Arc::clone(&events),
            exec: Arc::clone(&exec),
            console: Arc::clone(&console),
            identity: Arc::clone(&identity),
        };
        let router = Router::new(
            Arc::clone(&registry),
            handler_cx,
            control,
            Arc::clone(&signals),
        );

        Arc::new(Self {
            settings,
            main_queue: Arc::new(ConnectionQueue::new()),
            events_queue: Arc::new(ConnectionQueue::new()),
            events,
            registry,
            router,
            suspend,
            signals,
            exec,
            console,
            identity,
            children: Arc::new(ChildTracker::new()),
            shutdown: CancellationToken::new(),
            wait_methods: RwLock::new(HashSet::new()),
            completions: Mutex::new(Vec::new()),
            long_poll_engaged: AtomicBool::new(false),
            pump_last: Mutex::new(None),
        })
    }

    /// Shared handler state for RPC execution.
    pub fn handler_cx(&self) -> HandlerCx {
        HandlerCx {
            events: Arc::clone(&self.events),
            exec: Arc::clone(&self.exec),
            console: Arc::clone(&self.console),
            identity: Arc::clone(&self.identity),
        }
    }

    /// Register a method name the dispatch loop waits for, screening it
    /// out of background processing.
    pub fn register_wait_method(&self, name: impl Into<String>) {
        let _ = self.wait_methods.write().insert(name.into());
    }

    /// Whether `uri` addresses a registered wait-for-method target.
    pub fn is_wait_method_uri(&self, uri: &str) -> bool {
        let Some(method) = method_from_uri(uri) else {
            return false;
        };
        self.wait_methods.read().contains(method)
    }

    /// Queue work to run on the interpreter thread at the next dispatch
    /// iteration.
    pub fn queue_completion(&self, completion: Completion) {
        self.completions.lock().push(completion);
    }

    /// Run everything queued by [`Self::queue_completion`]. Interpreter
    /// thread only.
    pub fn run_pending_completions(&self) {
        let pending: Vec<Completion> = std::mem::take(&mut *self.completions.lock());
        if !pending.is_empty() {
            debug!(count = pending.len(), "running queued completions");
        }
        for completion in pending {
            completion();
        }
    }

    /// Mark that the client has engaged the long-poll channel at least
    /// once.
    pub fn set_long_poll_engaged(&self) {
        self.long_poll_engaged.store(true, Ordering::SeqCst);
    }

    /// Whether the long-poll channel has ever been engaged.
    pub fn long_poll_engaged(&self) -> bool {
        self.long_poll_engaged.load(Ordering::SeqCst)
    }

    /// Whether the client has been disconnected longer than the
    /// configured disconnected timeout.
    pub fn disconnected_timed_out(&self) -> bool {
        let minutes = self.settings.dispatch.disconnected_timeout_minutes;
        if minutes == 0 {
            return false;
        }
        match self.events_queue.last_enqueue_time() {
            Some(last) => last.elapsed() > Duration::from_secs(minutes * 60),
            None => false,
        }
    }

    /// Throttle helper for the busy-path pump: returns whether enough
    /// time has passed since the last run, recording this run if so.
    pub(crate) fn pump_due(&self, throttle: Duration) -> bool {
        let mut last = self.pump_last.lock();
        let now = Instant::now();
        match *last {
            Some(t) if now < t + throttle => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
