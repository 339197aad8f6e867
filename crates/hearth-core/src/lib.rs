//! # hearth-core
//!
//! Foundation types and seams for the Hearth interpreter session.
//!
//! This crate provides the shared vocabulary that all other Hearth crates
//! depend on:
//!
//! - **Interpreter seam**: the [`Interpreter`] trait and the shared
//!   [`ExecutionState`] (busy / interrupt-pending flags)
//! - **Console input**: the buffered-but-unexecuted input queue that the
//!   `interrupt` reserved method discards
//! - **Client identity**: active client id and protocol version checks
//! - **Suspend signals**: process-wide atomic flags writable from a signal
//!   handler
//! - **Session control**: the quit/exit seam implemented by the binary
//! - **Errors**: `CoreError` hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod client;
pub mod console;
pub mod control;
pub mod errors;
pub mod exec;
pub mod signals;

pub use client::ClientIdentity;
pub use console::ConsoleInputBuffer;
pub use control::{SessionControl, SuspendHandler};
pub use errors::CoreError;
pub use exec::{ExecutionState, Interpreter};
pub use signals::SuspendSignals;
