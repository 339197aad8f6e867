//! # hearth-events
//!
//! Outbound client notification types and the coalescing event queue.
//!
//! - **`ClientEvent`**: integer-tagged event envelope; delivery ids are
//!   assigned by the event service at drain time, never at creation
//! - **`EventQueue`**: buffers pending events, coalesces high-frequency
//!   console/build output into per-stream text buffers, and guarantees
//!   output is never reordered relative to the stream it belongs to

#![deny(unsafe_code)]

pub mod errors;
pub mod queue;
pub mod types;

pub use errors::EventError;
pub use queue::EventQueue;
pub use types::{ClientEvent, EventType, ALL_EVENT_TYPES};
