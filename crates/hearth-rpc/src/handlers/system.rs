//! System-level handlers: liveness, status, diagnostics.

use serde_json::{json, Value};

use crate::async_handle::AsyncHandle;
use crate::errors::RpcError;
use crate::registry::{HandlerCx, RpcHandler, RpcHandlerAsync};
use crate::types::RpcRequest;

/// `ping` — liveness probe.
pub struct PingHandler;

impl RpcHandler for PingHandler {
    fn call(&self, _request: &RpcRequest, _cx: &HandlerCx) -> Result<Value, RpcError> {
        Ok(json!(true))
    }
}

/// `session_status` — snapshot of dispatch-visible session state.
pub struct SessionStatusHandler;

impl RpcHandler for SessionStatusHandler {
    fn call(&self, _request: &RpcRequest, cx: &HandlerCx) -> Result<Value, RpcError> {
        Ok(json!({
            "busy": cx.exec.is_executing(),
            "interruptPending": cx.exec.interrupt_pending(),
            "pendingInput": cx.console.len(),
            "activeConsole": cx.events.active_console(),
            "hasEvents": cx.events.has_events(),
        }))
    }
}

/// `collect_diagnostics` — asynchronous diagnostics snapshot, delivered
/// as a completion event.
pub struct CollectDiagnosticsHandler;

impl RpcHandlerAsync for CollectDiagnosticsHandler {
    fn call(&self, _request: &RpcRequest, cx: &HandlerCx, completion: AsyncHandle) {
        let report = json!({
            "busy": cx.exec.is_executing(),
            "pendingInput": cx.console.len(),
            "activeClient": cx.identity.active_id(),
        });
        completion.complete(Ok(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::make_cx;
    use std::sync::Arc;

    #[test]
    fn ping_returns_true() {
        let cx = make_cx();
        let result = PingHandler.call(&RpcRequest::default(), &cx).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn session_status_reflects_state() {
        let cx = make_cx();
        cx.exec.set_executing(true);
        cx.console.push("1 + 1".into());

        let result = SessionStatusHandler
            .call(&RpcRequest::default(), &cx)
            .unwrap();
        assert_eq!(result["busy"], true);
        assert_eq!(result["pendingInput"], 1);
        assert_eq!(result["hasEvents"], false);
    }

    #[test]
    fn collect_diagnostics_completes_once() {
        let cx = make_cx();
        let handle = AsyncHandle::new(Arc::clone(&cx.events));
        let id = handle.id().to_string();

        RpcHandlerAsync::call(
            &CollectDiagnosticsHandler,
            &RpcRequest::default(),
            &cx,
            handle,
        );

        let mut out = Vec::new();
        cx.events.drain(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data["handle"], id);
        assert_eq!(out[0].data["response"]["result"]["busy"], false);
    }
}
