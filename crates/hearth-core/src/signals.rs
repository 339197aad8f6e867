//! Process-wide suspend request flags.
//!
//! Both flags may be written from a signal handler: stores only, no
//! allocation, no locking. Everything else about suspension (deadlines,
//! blocking ops, notifications) lives in the suspend controller and is
//! read cooperatively on the interpreter thread.

use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative and forced suspend request flags.
///
/// Cooperative requests are honored only at safe points and only when no
/// blocking operation is registered. Forced requests bypass blocking ops
/// and interrupt a busy interpreter.
#[derive(Debug, Default)]
pub struct SuspendSignals {
    cooperative: AtomicBool,
    forced: AtomicBool,
    from_timeout: AtomicBool,
}

impl SuspendSignals {
    /// Create with no pending requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cooperative suspend. Signal-safe.
    pub fn request_cooperative(&self) {
        self.cooperative.store(true, Ordering::SeqCst);
    }

    /// Request a forced suspend. Signal-safe.
    pub fn request_forced(&self) {
        self.forced.store(true, Ordering::SeqCst);
    }

    /// Whether a cooperative suspend is pending.
    pub fn cooperative_requested(&self) -> bool {
        self.cooperative.load(Ordering::SeqCst)
    }

    /// Whether a forced suspend is pending.
    pub fn forced_requested(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Mark whether the in-flight suspend attempt came from the idle
    /// timeout, so a failed attempt can clear the record.
    pub fn set_from_timeout(&self, value: bool) {
        self.from_timeout.store(value, Ordering::SeqCst);
    }

    /// Whether the in-flight suspend attempt came from the idle timeout.
    pub fn from_timeout(&self) -> bool {
        self.from_timeout.load(Ordering::SeqCst)
    }

    /// Clear both request flags after a failed or completed attempt.
    pub fn clear_requests(&self) {
        self.cooperative.store(false, Ordering::SeqCst);
        self.forced.store(false, Ordering::SeqCst);
    }
}
