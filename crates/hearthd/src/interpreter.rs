//! The demo interpreter and the interpreter-thread main loop.
//!
//! The dispatch core only sees the [`Interpreter`] trait; this echo
//! implementation exists so the daemon is exercisable end to end. It
//! evaluates in small slices and honors cooperative interrupts the same
//! way a real interpreter would.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use hearth_core::{CoreError, ExecutionState, Interpreter};
use hearth_events::ClientEvent;
use hearth_session::dispatch;
use hearth_session::{SessionContext, SessionError};

/// The method the interpreter thread waits on for input.
pub const CONSOLE_INPUT: &str = "console_input";

/// Echo interpreter: returns its input after a short sliced "evaluation".
pub struct EchoInterpreter {
    slice: Duration,
    slices_per_eval: u32,
}

impl EchoInterpreter {
    /// Create with the default evaluation pacing.
    pub fn new() -> Self {
        Self {
            slice: Duration::from_millis(10),
            slices_per_eval: 5,
        }
    }

    /// Create with custom pacing (tests use zero-length slices).
    pub fn with_pacing(slice: Duration, slices_per_eval: u32) -> Self {
        Self { slice, slices_per_eval }
    }
}

impl Default for EchoInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter for EchoInterpreter {
    fn evaluate(&mut self, input: &str, state: &ExecutionState) -> Result<String, CoreError> {
        for _ in 0..self.slices_per_eval {
            if state.take_interrupt() {
                return Err(CoreError::Interrupted);
            }
            std::thread::sleep(self.slice);
        }
        Ok(input.to_string())
    }
}

/// The interpreter thread's main loop: wait for console input, evaluate
/// it, report output as client events, repeat until shutdown.
pub fn run_loop(ctx: &Arc<SessionContext>, mut interpreter: impl Interpreter) {
    ctx.register_wait_method(CONSOLE_INPUT);
    loop {
        let allow_suspend = || !ctx.exec.is_executing();
        let request = match dispatch::wait_for_method_with_event(
            ctx,
            CONSOLE_INPUT,
            ClientEvent::busy(false),
            &allow_suspend,
        ) {
            Ok(request) => request,
            Err(SessionError::ShuttingDown) => break,
            Err(error) => {
                warn!(%error, "console input wait failed");
                break;
            }
        };

        if let Some(input) = request.param(0).and_then(Value::as_str) {
            ctx.console.push(input.to_string());
        }

        while let Some(line) = ctx.console.pop() {
            ctx.exec.set_executing(true);
            ctx.events.add(ClientEvent::busy(true));
            dispatch::pump_background(ctx);

            let result = interpreter.evaluate(&line, &ctx.exec);

            dispatch::pump_background(ctx);
            ctx.exec.set_executing(false);

            let console = ctx.events.active_console();
            match result {
                Ok(output) => ctx.events.add(ClientEvent::console_output(&console, &output)),
                Err(CoreError::Interrupted) => {
                    debug!("evaluation interrupted");
                    ctx.exec.set_interrupt_pending(false);
                }
                Err(error) => {
                    ctx.events
                        .add(ClientEvent::console_error(&console, &error.to_string()));
                }
            }
            ctx.events.add(ClientEvent::busy(false));
        }
    }
}
