//! # hearth-session
//!
//! The dispatch core of the Hearth session: connection queues bridging
//! network I/O to the single interpreter thread, the blocking
//! `wait_for_method` dispatch loop, connection-level RPC routing, the
//! suspend state machine, and the background event/offline services.
//!
//! Threading model: exactly one interpreter thread runs
//! [`dispatch::wait_for_method`] and every interpreter-affecting handler;
//! listener tasks only push onto [`ConnectionQueue`]; the event and
//! offline services are independent background threads restricted to
//! interpreter-free completion paths. Every blocking wait takes an
//! explicit timeout — there is no indefinite block anywhere.

#![deny(unsafe_code)]

pub mod blocking;
pub mod connection;
pub mod connection_queue;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod event_service;
pub mod offline;
pub mod router;
pub mod suspend;

#[cfg(test)]
pub(crate) mod test_support;

pub use blocking::{BlockingOpGuard, BlockingOps};
pub use connection::{Connection, HttpRequest, HttpResponse};
pub use connection_queue::ConnectionQueue;
pub use context::{ChildGuard, ChildTracker, SessionContext};
pub use errors::SessionError;
pub use event_service::EventService;
pub use offline::{AuxPoller, OfflineService};
pub use router::{ConnectionType, Router};
pub use suspend::{SuspendController, SuspendMode};
