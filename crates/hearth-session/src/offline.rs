//! Interpreter-free background execution.
//!
//! While the interpreter is busy evaluating and the client is long-poll
//! connected, this service siphons off requests that do not need the
//! interpreter: allow-listed methods old enough to have visibly stalled
//! are executed directly on this thread, and ordinary RPCs older than the
//! (shorter) async threshold are promoted to async completion so their
//! callers unblock.
//!
//! Offline execution is doubly gated: the configuration allow-list names
//! candidate methods, but a handler only runs here if it was registered
//! with the offline-safe capability marker. Configuration cannot opt an
//! unsafe handler into background execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hearth_events::{ClientEvent, EventQueue};
use hearth_rpc::{method_from_uri, RpcRequest, CLIENT_INIT, INTERRUPT, QUIT_SESSION, SUSPEND_SESSION};

use crate::context::SessionContext;
use crate::errors::SessionError;
use crate::router::ConnectionType;

/// An auxiliary subsystem polled while the interpreter is busy.
pub trait AuxPoller: Send + Sync {
    /// Poller name, for logs.
    fn name(&self) -> &str;
    /// One poll; may enqueue events but must not touch the interpreter.
    fn poll(&self, events: &EventQueue);
}

/// Periodic resident-memory report.
pub struct MemoryUsagePoller {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl MemoryUsagePoller {
    /// Report at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }
}

impl AuxPoller for MemoryUsagePoller {
    fn name(&self) -> &str {
        "memory-usage"
    }

    fn poll(&self, events: &EventQueue) {
        let mut last = self.last.lock();
        let now = Instant::now();
        if last.is_some_and(|t| now < t + self.interval) {
            return;
        }
        *last = Some(now);
        if let Some(resident_kb) = resident_memory_kb() {
            events.add(ClientEvent::memory_usage(resident_kb));
        }
    }
}

/// Resident set size in kilobytes, where the platform exposes it.
#[cfg(target_os = "linux")]
fn resident_memory_kb() -> Option<u64> {
    // /proc/self/statm reports pages; assume the common 4 KiB page
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kb() -> Option<u64> {
    None
}

/// Background worker for interpreter-free request execution.
pub struct OfflineService {
    ctx: Arc<SessionContext>,
    stop: CancellationToken,
    pollers: Vec<Arc<dyn AuxPoller>>,
}

impl OfflineService {
    /// Create the service with the built-in memory poller. Allow-listed
    /// methods that lack the offline-safe marker are reported once here.
    pub fn new(ctx: Arc<SessionContext>, stop: CancellationToken) -> Self {
        for method in &ctx.settings.offline.allow_list {
            if ctx.registry.has_method(method) && !ctx.registry.is_offline_safe(method) {
                warn!(
                    %method,
                    "allow-listed method is not marked offline-safe and will not run offline"
                );
            }
        }
        let mut pollers: Vec<Arc<dyn AuxPoller>> = Vec::new();
        let memory_secs = ctx.settings.offline.memory_event_interval_secs;
        if memory_secs > 0 {
            pollers.push(Arc::new(MemoryUsagePoller::new(Duration::from_secs(
                memory_secs,
            ))));
        }
        Self { ctx, stop, pollers }
    }

    /// Add an auxiliary poller.
    #[must_use]
    pub fn with_poller(mut self, poller: Arc<dyn AuxPoller>) -> Self {
        self.pollers.push(poller);
        self
    }

    /// Launch the interval loop on its own thread. Failure to spawn is
    /// fatal at startup.
    pub fn start(self) -> Result<std::thread::JoinHandle<()>, SessionError> {
        std::thread::Builder::new()
            .name("offline-service".into())
            .spawn(move || self.run())
            .map_err(|source| SessionError::ServiceStart {
                service: "offline-service",
                source,
            })
    }

    fn run(&self) {
        debug!("offline service started");
        let interval = Duration::from_millis(self.ctx.settings.offline.interval_ms);
        while !self.stop.is_cancelled() {
            std::thread::sleep(interval);
            self.tick();
        }
        debug!("offline service stopped");
    }

    /// One service iteration. Only acts while the interpreter is busy and
    /// the long-poll channel has been engaged at least once.
    pub fn tick(&self) {
        if !self.ctx.exec.is_executing() || !self.ctx.long_poll_engaged() {
            return;
        }
        self.execute_offline_ready();
        for poller in &self.pollers {
            poller.poll(&self.ctx.events);
        }
        self.promote_stale_rpcs();
    }

    /// Execute every allow-listed, offline-safe request that has waited
    /// past the offline threshold, until none remain.
    fn execute_offline_ready(&self) {
        let threshold = Duration::from_millis(self.ctx.settings.offline.offline_threshold_ms);
        loop {
            let Some(connection) = self.ctx.main_queue.dequeue_matching(|c| {
                let Some(method) = method_from_uri(c.uri()) else {
                    return false;
                };
                self.ctx
                    .settings
                    .offline
                    .allow_list
                    .iter()
                    .any(|allowed| allowed == method)
                    && self.ctx.registry.is_offline_safe(method)
                    && c.age() >= threshold
            }) else {
                break;
            };
            debug!(uri = connection.uri(), "executing request without the interpreter");
            self.ctx
                .router
                .route_connection(connection, ConnectionType::Background);
        }
    }

    /// Promote ordinary RPCs older than the async threshold so their
    /// callers unblock even though the interpreter is still busy.
    fn promote_stale_rpcs(&self) {
        let threshold = Duration::from_millis(self.ctx.settings.offline.async_promotion_ms);
        let events = Arc::clone(&self.ctx.events);
        let ctx = &self.ctx;
        let promoted = self.ctx.main_queue.convert_matching(
            |connection| {
                if connection.is_acknowledged() || connection.age() < threshold {
                    return false;
                }
                let Some(method) = method_from_uri(connection.uri()) else {
                    return false;
                };
                !is_promotion_exempt(method) && !ctx.is_wait_method_uri(connection.uri())
            },
            |connection| match RpcRequest::parse(connection.uri(), connection.body()) {
                Ok(parsed) => match connection.promote_to_async(&events, parsed) {
                    Ok(promoted) => Some(promoted),
                    Err(error) => {
                        debug!(%error, "client went away before promotion ack");
                        None
                    }
                },
                Err(error) => {
                    let mut connection = connection;
                    if let Err(send_error) = connection.send_rpc_error(&error) {
                        debug!(%send_error, "promotion error response not delivered");
                    }
                    None
                }
            },
        );
        if promoted > 0 {
            debug!(promoted, "promoted stale rpcs to async completion");
        }
    }
}

/// Methods that must never be promoted: the reserved lifecycle methods
/// stay fast-path, and `client_init` must answer on its own connection.
fn is_promotion_exempt(method: &str) -> bool {
    matches!(method, QUIT_SESSION | SUSPEND_SESSION | INTERRUPT | CLIENT_INIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_connection, make_context_with, recv_json};
    use hearth_rpc::registry::OfflineSafe;
    use hearth_rpc::{HandlerCx, RpcError};
    use hearth_settings::HearthSettings;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offline_settings() -> HearthSettings {
        let mut settings = HearthSettings::default();
        settings.offline.offline_threshold_ms = 0;
        settings.offline.async_promotion_ms = 0;
        settings.offline.memory_event_interval_secs = 0;
        settings
    }

    fn busy_ctx(
        settings: HearthSettings,
        configure: impl FnOnce(&mut hearth_rpc::MethodRegistry),
    ) -> (Arc<SessionContext>, String) {
        let ctx = make_context_with(settings, configure);
        let client = ctx.identity.rotate();
        ctx.exec.set_executing(true);
        ctx.set_long_poll_engaged();
        (ctx, client)
    }

    fn rpc_body(method: &str, client_id: &str) -> String {
        serde_json::to_string(&json!({"method": method, "clientId": client_id})).unwrap()
    }

    #[test]
    fn idle_interpreter_means_no_offline_work() {
        let (ctx, client) = busy_ctx(offline_settings(), |_| {});
        ctx.exec.set_executing(false);
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (ping, _rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);
        service.tick();
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn requires_long_poll_engagement() {
        let ctx = make_context_with(offline_settings(), |_| {});
        let client = ctx.identity.rotate();
        ctx.exec.set_executing(true);
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (ping, _rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);
        service.tick();
        // ping stays queued, but promotion is also gated off
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn executes_allow_listed_requests_while_busy() {
        let (ctx, client) = busy_ctx(offline_settings(), |_| {});
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (ping, rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);
        service.tick();

        assert_eq!(recv_json(rx)["result"], true);
        assert!(ctx.main_queue.is_empty());
    }

    #[test]
    fn drains_every_ready_offline_request() {
        let (ctx, client) = busy_ctx(offline_settings(), |_| {});
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (a, a_rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        let (b, b_rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(a);
        ctx.main_queue.enqueue(b);
        service.tick();

        assert_eq!(recv_json(a_rx)["result"], true);
        assert_eq!(recv_json(b_rx)["result"], true);
    }

    #[test]
    fn refuses_allow_listed_but_unmarked_handler() {
        let mut settings = offline_settings();
        settings.offline.allow_list.push("unsafe_op".into());
        // keep it away from promotion so the refusal is observable
        settings.offline.async_promotion_ms = 60_000;
        let (ctx, client) = busy_ctx(settings, |registry| {
            registry.register_sync(
                "unsafe_op",
                OfflineSafe::No,
                |_: &hearth_rpc::RpcRequest, _: &HandlerCx| -> Result<Value, RpcError> {
                    Ok(json!("ran"))
                },
            );
        });
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (conn, _rx) = make_connection("/rpc/unsafe_op", &rpc_body("unsafe_op", &client));
        ctx.main_queue.enqueue(conn);
        service.tick();

        // the capability marker wins over configuration
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn young_requests_wait_for_the_threshold() {
        let mut settings = offline_settings();
        settings.offline.offline_threshold_ms = 60_000;
        settings.offline.async_promotion_ms = 60_000;
        let (ctx, client) = busy_ctx(settings, |_| {});
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (ping, _rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);
        service.tick();
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn stale_rpc_promoted_and_later_completed_via_event() {
        let (ctx, client) = busy_ctx(offline_settings(), |registry| {
            registry.register_sync(
                "slow_op",
                OfflineSafe::No,
                |_: &hearth_rpc::RpcRequest, _: &HandlerCx| Ok(json!("done")),
            );
        });
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (conn, rx) = make_connection("/rpc/slow_op", &rpc_body("slow_op", &client));
        ctx.main_queue.enqueue(conn);
        service.tick();

        // caller was unblocked with an async ack
        let ack = recv_json(rx);
        let handle = ack["asyncHandle"].as_str().unwrap().to_string();

        // the promoted connection is still queued, in order, and is later
        // routed normally (here: by the interpreter thread catching up)
        assert_eq!(ctx.main_queue.len(), 1);
        let promoted = ctx.main_queue.try_dequeue().unwrap();
        assert!(promoted.is_acknowledged());
        ctx.router.route_connection(promoted, ConnectionType::Foreground);

        let mut out = Vec::new();
        ctx.events.drain(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data["handle"], handle);
        assert_eq!(out[0].data["response"]["result"], "done");
    }

    #[test]
    fn reserved_methods_are_never_promoted() {
        let (ctx, client) = busy_ctx(offline_settings(), |_| {});
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (conn, _rx) = make_connection("/rpc/interrupt", &rpc_body("interrupt", &client));
        ctx.main_queue.enqueue(conn);
        service.tick();

        let head = ctx.main_queue.try_dequeue().unwrap();
        assert!(!head.is_acknowledged());
    }

    #[test]
    fn wait_method_uris_are_never_promoted() {
        let (ctx, client) = busy_ctx(offline_settings(), |_| {});
        ctx.register_wait_method("console_input");
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new());

        let (conn, _rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(conn);
        service.tick();

        let head = ctx.main_queue.try_dequeue().unwrap();
        assert!(!head.is_acknowledged());
    }

    #[test]
    fn aux_pollers_run_while_busy() {
        struct CountingPoller(AtomicUsize);
        impl AuxPoller for CountingPoller {
            fn name(&self) -> &str {
                "counting"
            }
            fn poll(&self, _events: &EventQueue) {
                let _ = self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (ctx, _client) = busy_ctx(offline_settings(), |_| {});
        let poller = Arc::new(CountingPoller(AtomicUsize::new(0)));
        let service = OfflineService::new(Arc::clone(&ctx), CancellationToken::new())
            .with_poller(Arc::clone(&poller) as Arc<dyn AuxPoller>);

        service.tick();
        service.tick();
        assert_eq!(poller.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn service_thread_stops_on_cancel() {
        let (ctx, _client) = busy_ctx(offline_settings(), |_| {});
        let stop = CancellationToken::new();
        let service = OfflineService::new(ctx, stop.clone());
        let handle = service.start().unwrap();
        stop.cancel();
        handle.join().unwrap();
    }
}
