//! Interpreter seam and shared execution state.
//!
//! The interpreter itself is owned exclusively by the interpreter thread.
//! Other threads only observe it through [`ExecutionState`], which carries
//! the busy flag and the cooperative interrupt-pending flag as atomics.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::CoreError;

/// The embedded interpreter, reduced to the three operations the dispatch
/// core needs: evaluate, request an interrupt, and report busyness.
///
/// Implementations run `evaluate` on the interpreter thread only. The
/// interrupt is cooperative: `evaluate` is expected to poll
/// [`ExecutionState::take_interrupt`] at safe points and bail out.
pub trait Interpreter: Send {
    /// Evaluate one unit of input, producing its textual output.
    fn evaluate(&mut self, input: &str, state: &ExecutionState) -> Result<String, CoreError>;
}

/// Cross-thread view of the interpreter's execution state.
///
/// `executing` is written by the interpreter thread around every evaluation
/// and read by background services deciding whether offline work may run.
/// `interrupt_pending` is set from any thread and consumed cooperatively by
/// the evaluation loop.
#[derive(Debug, Default)]
pub struct ExecutionState {
    executing: AtomicBool,
    interrupt_pending: AtomicBool,
}

impl ExecutionState {
    /// Create a new idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the interpreter as busy or idle.
    pub fn set_executing(&self, executing: bool) {
        self.executing.store(executing, Ordering::SeqCst);
    }

    /// Whether the interpreter is currently evaluating.
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    /// Request a cooperative interrupt of the current evaluation.
    pub fn set_interrupt_pending(&self, pending: bool) {
        self.interrupt_pending.store(pending, Ordering::SeqCst);
    }

    /// Whether an interrupt has been requested and not yet consumed.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_pending.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt, returning whether one was set.
    pub fn take_interrupt(&self) -> bool {
        self.interrupt_pending.swap(false, Ordering::SeqCst)
    }
}
