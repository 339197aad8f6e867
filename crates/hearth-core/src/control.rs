//! Process lifecycle seams implemented by the binary.
//!
//! Quitting and suspending both end the process, which makes them
//! untestable if called directly. The dispatch core only ever talks to
//! these traits; the binary supplies implementations that serialize state
//! and exit, tests supply recorders.

use crate::errors::CoreError;

/// Ends the session process after a `quit_session` request.
///
/// The real implementation drains outstanding state and exits with
/// `status`; it is documented to not return. Test implementations record
/// the call and return so assertions can run.
pub trait SessionControl: Send + Sync {
    /// Initiate process shutdown with the given exit status.
    fn initiate_quit(&self, status: i32);
}

/// Performs the actual suspension: serialize interpreter state, then exit
/// (or signal the parent to relaunch).
///
/// Returns `Ok(())` only when serialization succeeded; in production the
/// process exits before the call returns, so an `Ok` return is observable
/// only from test implementations. A serialization failure returns `Err`
/// and the session keeps running.
pub trait SuspendHandler: Send + Sync {
    /// Attempt suspension. `force` skips best-effort state that fails to
    /// serialize rather than aborting the attempt.
    fn suspend(&self, force: bool) -> Result<(), CoreError>;
}
