//! # hearth-server
//!
//! Thin axum listener for the Hearth session. Its whole job is the
//! bridge the dispatch core expects from a listener: accept a request,
//! wrap it into a `Connection` whose response sink is a oneshot channel,
//! push it onto the right connection queue by URI shape, and wait (with a
//! timeout) for whichever thread completes it. Plus a health probe.

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod server;
pub mod shutdown;

pub use errors::ServerError;
pub use server::{AppState, HearthServer};
pub use shutdown::ShutdownCoordinator;
