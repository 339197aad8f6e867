//! Thread-safe, timeout-aware FIFO of inbound connections.
//!
//! Listener tasks push; the dispatch loop and background services pop.
//! Two independent instances exist per session — one for ordinary RPC
//! traffic and one dedicated to long-poll get-events connections — so a
//! flood of RPCs can never starve event delivery.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::connection::Connection;

#[derive(Default)]
struct Inner {
    queue: VecDeque<Connection>,
    last_enqueue: Option<Instant>,
}

/// Mutex + condvar guarded connection FIFO.
///
/// Every blocking operation takes an explicit timeout so the owning
/// thread can periodically re-check external stop/suspend signals.
#[derive(Default)]
pub struct ConnectionQueue {
    state: Mutex<Inner>,
    cond: Condvar,
}

impl ConnectionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a connection onto the tail.
    pub fn enqueue(&self, connection: Connection) {
        let mut state = self.state.lock();
        state.queue.push_back(connection);
        state.last_enqueue = Some(Instant::now());
        drop(state);
        let _ = self.cond.notify_one();
    }

    /// Pop the head, waiting up to `timeout` for one to arrive.
    pub fn dequeue(&self, timeout: Duration) -> Option<Connection> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(connection) = state.queue.pop_front() {
                return Some(connection);
            }
            if Instant::now() >= deadline {
                return None;
            }
            let _ = self.cond.wait_until(&mut state, deadline);
        }
    }

    /// Pop the head if one is already queued. Never blocks.
    pub fn try_dequeue(&self) -> Option<Connection> {
        self.state.lock().queue.pop_front()
    }

    /// Remove and return the first connection matching `predicate`,
    /// scanning from the head. Never blocks.
    pub fn dequeue_matching(
        &self,
        predicate: impl Fn(&Connection) -> bool,
    ) -> Option<Connection> {
        let mut state = self.state.lock();
        let index = state.queue.iter().position(predicate)?;
        state.queue.remove(index)
    }

    /// The URI at the head of the line, without removing it.
    pub fn peek_next_uri(&self) -> Option<String> {
        self.state
            .lock()
            .queue
            .front()
            .map(|c| c.uri().to_string())
    }

    /// Replace matching entries in place, preserving queue order.
    ///
    /// `transform` consumes each matching connection; returning `None`
    /// removes it from the queue (the transform is expected to have
    /// responded to it). Returns how many entries matched.
    pub fn convert_matching(
        &self,
        predicate: impl Fn(&Connection) -> bool,
        mut transform: impl FnMut(Connection) -> Option<Connection>,
    ) -> usize {
        let mut state = self.state.lock();
        let mut matched = 0;
        let drained = std::mem::take(&mut state.queue);
        state.queue = drained
            .into_iter()
            .filter_map(|connection| {
                if predicate(&connection) {
                    matched += 1;
                    transform(connection)
                } else {
                    Some(connection)
                }
            })
            .collect();
        matched
    }

    /// When the most recent connection arrived, if any ever has.
    pub fn last_enqueue_time(&self) -> Option<Instant> {
        self.state.lock().last_enqueue
    }

    /// Number of queued connections.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use super::*;
    use crate::connection::{HttpRequest, HttpResponse};

    fn make_connection(uri: &str) -> Connection {
        let (tx, rx) = oneshot::channel::<HttpResponse>();
        // receiver dropped; these tests never respond
        drop(rx);
        Connection::new(HttpRequest::post(uri, "{}"), tx)
    }

    #[test]
    fn fifo_order() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/a"));
        queue.enqueue(make_connection("/rpc/b"));
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap().uri(), "/rpc/a");
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap().uri(), "/rpc/b");
    }

    #[test]
    fn dequeue_times_out_when_empty() {
        let queue = ConnectionQueue::new();
        let started = Instant::now();
        assert!(queue.dequeue(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn dequeue_wakes_on_enqueue() {
        let queue = Arc::new(ConnectionQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.enqueue(make_connection("/rpc/late"));
            })
        };
        let connection = queue.dequeue(Duration::from_secs(5)).unwrap();
        assert_eq!(connection.uri(), "/rpc/late");
        producer.join().unwrap();
    }

    #[test]
    fn never_returns_same_connection_twice() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/only"));
        assert!(queue.dequeue(Duration::ZERO).is_some());
        assert!(queue.dequeue(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn dequeue_matching_takes_first_match_only() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/a"));
        queue.enqueue(make_connection("/rpc/target"));
        queue.enqueue(make_connection("/rpc/target"));

        let taken = queue
            .dequeue_matching(|c| c.uri() == "/rpc/target")
            .unwrap();
        assert_eq!(taken.uri(), "/rpc/target");
        assert_eq!(queue.len(), 2);
        // head of line untouched
        assert_eq!(queue.peek_next_uri().as_deref(), Some("/rpc/a"));
    }

    #[test]
    fn dequeue_matching_without_match() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/a"));
        assert!(queue.dequeue_matching(|c| c.uri() == "/rpc/b").is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn peek_does_not_remove() {
        let queue = ConnectionQueue::new();
        assert!(queue.peek_next_uri().is_none());
        queue.enqueue(make_connection("/rpc/head"));
        assert_eq!(queue.peek_next_uri().as_deref(), Some("/rpc/head"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn convert_matching_preserves_order() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/a"));
        queue.enqueue(make_connection("/rpc/b"));
        queue.enqueue(make_connection("/rpc/c"));

        let matched = queue.convert_matching(|c| c.uri() == "/rpc/b", Some);
        assert_eq!(matched, 1);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap().uri(), "/rpc/a");
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap().uri(), "/rpc/b");
        assert_eq!(queue.dequeue(Duration::ZERO).unwrap().uri(), "/rpc/c");
    }

    #[test]
    fn convert_matching_can_drop_entries() {
        let queue = ConnectionQueue::new();
        queue.enqueue(make_connection("/rpc/drop"));
        queue.enqueue(make_connection("/rpc/keep"));

        let matched = queue.convert_matching(|c| c.uri() == "/rpc/drop", |_c| None);
        assert_eq!(matched, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_next_uri().as_deref(), Some("/rpc/keep"));
    }

    #[test]
    fn last_enqueue_time_updates() {
        let queue = ConnectionQueue::new();
        assert!(queue.last_enqueue_time().is_none());
        queue.enqueue(make_connection("/rpc/a"));
        let first = queue.last_enqueue_time().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        queue.enqueue(make_connection("/rpc/b"));
        assert!(queue.last_enqueue_time().unwrap() > first);
    }
}
