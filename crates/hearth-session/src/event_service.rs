//! The long-poll event delivery service.
//!
//! A background thread that answers get-events connections from the
//! dedicated events queue. It owns the monotonically increasing delivery
//! id counter and a bounded rolling list of delivered-but-unacknowledged
//! events: ids are assigned only at drain time, a client acknowledging up
//! to id N prunes everything ≤ N, and whatever remains is re-sent first
//! (the previous response may have been lost with its connection).
//!
//! Rapid event bursts are batched: once at least one event is pending the
//! service keeps draining while further events arrive within the debounce
//! window, bounded by a maximum total batching delay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hearth_events::ClientEvent;
use hearth_rpc::{GetEventsRequest, GetEventsResponse, RpcError};

use crate::connection::{Connection, HttpResponse};
use crate::context::SessionContext;
use crate::errors::SessionError;

/// Granularity of the first-event wait, so stop requests are noticed.
const WAIT_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct DeliveryState {
    next_id: i64,
    delivered: VecDeque<ClientEvent>,
}

/// Background worker answering long-poll get-events connections.
pub struct EventService {
    ctx: Arc<SessionContext>,
    stop: CancellationToken,
    state: Mutex<DeliveryState>,
}

impl EventService {
    /// Create a service over the session's events queue.
    pub fn new(ctx: Arc<SessionContext>, stop: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            stop,
            state: Mutex::new(DeliveryState {
                next_id: 1,
                delivered: VecDeque::new(),
            }),
        })
    }

    /// Launch the accept loop on its own thread. Failure to spawn is
    /// fatal at startup.
    pub fn start(self: &Arc<Self>) -> Result<std::thread::JoinHandle<()>, SessionError> {
        let service = Arc::clone(self);
        std::thread::Builder::new()
            .name("event-service".into())
            .spawn(move || service.run())
            .map_err(|source| SessionError::ServiceStart {
                service: "event-service",
                source,
            })
    }

    fn run(&self) {
        debug!("event service started");
        let accept = Duration::from_secs(self.ctx.settings.events.accept_wait_secs);
        let last_chance = Duration::from_millis(self.ctx.settings.events.last_chance_wait_ms);
        loop {
            let stopping = self.stop.is_cancelled();
            let timeout = if stopping { last_chance } else { accept };
            match self.ctx.events_queue.dequeue(timeout) {
                Some(connection) => self.handle_connection(connection),
                None if stopping => break,
                None => {}
            }
        }
        debug!("event service stopped");
    }

    /// Answer one long-poll connection.
    fn handle_connection(&self, mut connection: Connection) {
        self.ctx.set_long_poll_engaged();

        let request: GetEventsRequest = match serde_json::from_str(connection.body()) {
            Ok(request) => request,
            Err(e) => {
                let error = RpcError::InvalidRequest {
                    message: format!("malformed get_events body: {e}"),
                };
                if let Err(send_error) = connection.send_rpc_error(&error) {
                    debug!(%send_error, "get_events error response not delivered");
                }
                return;
            }
        };

        if !self.ctx.identity.is_active(&request.client_id) {
            if let Err(send_error) = connection.send_rpc_error(&RpcError::InvalidClientId) {
                debug!(%send_error, "get_events error response not delivered");
            }
            return;
        }

        // prune everything the client acknowledges; re-send the rest
        {
            let mut state = self.state.lock();
            state
                .delivered
                .retain(|e| e.id.is_some_and(|id| id > request.last_event_id_seen));
            if !state.delivered.is_empty() {
                let resend: Vec<ClientEvent> = state.delivered.iter().cloned().collect();
                drop(state);
                debug!(count = resend.len(), "re-sending unacknowledged events");
                self.respond(connection, resend);
                return;
            }
        }

        self.wait_for_first_event();
        if self.ctx.events.has_events() {
            self.debounce_batch();
        }

        let mut batch = Vec::new();
        self.ctx.events.drain(&mut batch);
        {
            let mut state = self.state.lock();
            for event in &mut batch {
                event.id = Some(state.next_id);
                state.next_id += 1;
            }
            state.delivered.extend(batch.iter().cloned());
            let cap = self.ctx.settings.events.max_delivered_retained;
            while state.delivered.len() > cap {
                let _ = state.delivered.pop_front();
            }
        }
        self.respond(connection, batch);
    }

    fn wait_for_first_event(&self) {
        let max_wait = Duration::from_secs(self.ctx.settings.events.long_poll_max_wait_secs);
        let deadline = Instant::now() + max_wait;
        while !self.ctx.events.has_events() {
            if self.stop.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let slice = (deadline - now).min(WAIT_SLICE);
            let _ = self.ctx.events.wait_for_event(slice);
        }
    }

    fn debounce_batch(&self) {
        let debounce = Duration::from_millis(self.ctx.settings.events.debounce_ms);
        let batch_deadline =
            Instant::now() + Duration::from_millis(self.ctx.settings.events.max_batch_delay_ms);
        loop {
            let Some(mark) = self.ctx.events.last_add() else {
                return;
            };
            let now = Instant::now();
            if now >= batch_deadline {
                return;
            }
            let window = debounce.min(batch_deadline - now);
            if !self.ctx.events.wait_for_add_after(mark, window) {
                return;
            }
        }
    }

    fn respond(&self, mut connection: Connection, events: Vec<ClientEvent>) {
        let response = GetEventsResponse {
            events,
            events_pending: self.ctx.events.has_events(),
        };
        if let Err(error) = connection.send_response(HttpResponse::json(&response)) {
            debug!(%error, "get_events response not delivered");
        }
    }

    /// The next delivery id that will be assigned.
    pub fn next_event_id(&self) -> i64 {
        self.state.lock().next_id
    }
}
