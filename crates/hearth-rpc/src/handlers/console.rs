//! Console-targeting handlers.

use serde_json::{json, Value};

use crate::errors::RpcError;
use crate::handlers::require_string_param;
use crate::registry::{HandlerCx, RpcHandler};
use crate::types::RpcRequest;

/// `set_active_console` — retarget console output attribution.
///
/// Fires an active-console-changed event only when the target actually
/// changed; re-selecting the current console is a no-op.
pub struct SetActiveConsoleHandler;

impl RpcHandler for SetActiveConsoleHandler {
    fn call(&self, request: &RpcRequest, cx: &HandlerCx) -> Result<Value, RpcError> {
        let console = require_string_param(request, 0, "console")?;
        let changed = cx.events.set_active_console(&console);
        if changed {
            cx.events
                .add(hearth_events::ClientEvent::active_console_changed(&console));
        }
        Ok(json!({ "changed": changed }))
    }
}
