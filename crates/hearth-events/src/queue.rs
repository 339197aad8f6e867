//! The coalescing outbound event queue.
//!
//! Console and build output arrive as many tiny fragments; queueing one
//! event per fragment would flood the long-poll channel. Bufferable types
//! are instead appended to a per-type text buffer and flushed as a single
//! coalesced event. Flush ordering guarantees:
//!
//! - appending to one bufferable type first flushes every *other*
//!   bufferable type's buffer, so interleaved stdout/stderr never reorder
//! - adding a non-bufferable event first flushes all buffers, so output
//!   never appears after an event that was produced later
//! - switching the active console flushes before retargeting, so buffered
//!   output is always attributed to the console it was written under

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::types::{ClientEvent, EventType};

/// The console id output is attributed to before any retargeting.
pub const DEFAULT_CONSOLE: &str = "";

#[derive(Debug)]
struct Inner {
    pending: Vec<ClientEvent>,
    buffers: HashMap<EventType, String>,
    active_console: String,
    last_add: Option<Instant>,
}

impl Inner {
    fn has_events(&self) -> bool {
        !self.pending.is_empty() || self.buffers.values().any(|b| !b.is_empty())
    }

    fn flush_buffer(&mut self, event_type: EventType) {
        let Some(buffer) = self.buffers.get_mut(&event_type) else {
            return;
        };
        if buffer.is_empty() {
            return;
        }
        let text = std::mem::take(buffer);
        let event = match event_type {
            EventType::ConsoleOutput => {
                ClientEvent::console_output(&self.active_console, &text)
            }
            EventType::ConsoleError => {
                ClientEvent::console_error(&self.active_console, &text)
            }
            _ => ClientEvent::build_output(&text),
        };
        self.pending.push(event);
    }

    fn flush_all_buffers(&mut self) {
        let types: Vec<EventType> = self.buffers.keys().copied().collect();
        for ty in types {
            self.flush_buffer(ty);
        }
    }

    fn flush_other_buffers(&mut self, except: EventType) {
        let types: Vec<EventType> = self
            .buffers
            .keys()
            .copied()
            .filter(|t| *t != except)
            .collect();
        for ty in types {
            self.flush_buffer(ty);
        }
    }
}

/// Thread-safe queue of outbound client events with output coalescing.
#[derive(Debug)]
pub struct EventQueue {
    state: Mutex<Inner>,
    cond: Condvar,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Inner {
                pending: Vec::new(),
                buffers: HashMap::new(),
                active_console: DEFAULT_CONSOLE.to_string(),
                last_add: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Queue an event.
    ///
    /// Bufferable events with a text payload are coalesced; everything
    /// else is appended to the pending list after flushing all buffers.
    pub fn add(&self, event: ClientEvent) {
        let mut state = self.state.lock();
        if event.event_type.is_bufferable() {
            if let Some(text) = event.text_payload() {
                state.flush_other_buffers(event.event_type);
                state
                    .buffers
                    .entry(event.event_type)
                    .or_default()
                    .push_str(text);
            } else {
                // bufferable type without a text payload cannot coalesce
                state.flush_all_buffers();
                state.pending.push(event);
            }
        } else {
            state.flush_all_buffers();
            state.pending.push(event);
        }
        state.last_add = Some(Instant::now());
        drop(state);
        let _ = self.cond.notify_all();
    }

    /// Retarget output attribution to `console`.
    ///
    /// Flushes existing buffers first so output written under the previous
    /// console is never attributed to the new one. Returns whether the
    /// target actually changed.
    pub fn set_active_console(&self, console: &str) -> bool {
        let mut state = self.state.lock();
        if state.active_console == console {
            return false;
        }
        state.flush_all_buffers();
        state.active_console = console.to_string();
        true
    }

    /// The console output is currently attributed to.
    pub fn active_console(&self) -> String {
        self.state.lock().active_console.clone()
    }

    /// Flush all buffers, then move every pending event into `out`.
    pub fn drain(&self, out: &mut Vec<ClientEvent>) {
        let mut state = self.state.lock();
        state.flush_all_buffers();
        out.append(&mut state.pending);
    }

    /// Whether anything is pending or buffered.
    pub fn has_events(&self) -> bool {
        self.state.lock().has_events()
    }

    /// Block until an event is available or `timeout` elapses. Returns
    /// whether an event is available.
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.has_events() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let _ = self.cond.wait_until(&mut state, deadline);
        }
    }

    /// Block until an add newer than `mark` happens or `timeout` elapses.
    /// Returns whether such an add happened.
    pub fn wait_for_add_after(&self, mark: Instant, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.last_add.is_some_and(|t| t > mark) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let _ = self.cond.wait_until(&mut state, deadline);
        }
    }

    /// Whether any add happened after `mark`.
    pub fn event_added_since(&self, mark: Instant) -> bool {
        self.state.lock().last_add.is_some_and(|t| t > mark)
    }

    /// When the most recent add happened, if any.
    pub fn last_add(&self) -> Option<Instant> {
        self.state.lock().last_add
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
