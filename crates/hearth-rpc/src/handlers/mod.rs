//! Built-in RPC handlers and registration.

pub mod console;
pub mod system;

use serde_json::Value;

use crate::errors::RpcError;
use crate::registry::{MethodRegistry, OfflineSafe};
use crate::types::RpcRequest;

/// Register every built-in handler with the registry.
pub fn register_builtin(registry: &mut MethodRegistry) {
    // System
    registry.register_sync("ping", OfflineSafe::Yes, system::PingHandler);
    registry.register_sync("session_status", OfflineSafe::Yes, system::SessionStatusHandler);
    registry.register_async("collect_diagnostics", OfflineSafe::No, system::CollectDiagnosticsHandler);

    // Console
    registry.register_sync("set_active_console", OfflineSafe::Yes, console::SetActiveConsoleHandler);
}

/// Extract a required positional parameter.
pub(crate) fn require_param<'a>(
    request: &'a RpcRequest,
    index: usize,
    name: &str,
) -> Result<&'a Value, RpcError> {
    request
        .param(index)
        .ok_or_else(|| RpcError::invalid_params(format!("missing required parameter: {name}")))
}

/// Extract a required positional string parameter.
pub(crate) fn require_string_param(
    request: &RpcRequest,
    index: usize,
    name: &str,
) -> Result<String, RpcError> {
    require_param(request, index, name)?
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| RpcError::invalid_params(format!("parameter '{name}' must be a string")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_builtin_populates_registry() {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry);
        assert!(registry.has_method("ping"));
        assert!(registry.has_method("session_status"));
        assert!(registry.has_method("set_active_console"));
        assert!(registry.has_method("collect_diagnostics"));
    }

    #[test]
    fn builtin_offline_markers() {
        let mut registry = MethodRegistry::new();
        register_builtin(&mut registry);
        assert!(registry.is_offline_safe("ping"));
        assert!(registry.is_offline_safe("session_status"));
        assert!(registry.is_offline_safe("set_active_console"));
        assert!(!registry.is_offline_safe("collect_diagnostics"));
    }

    #[test]
    fn require_param_present() {
        let mut req = RpcRequest::default();
        req.params = vec![json!("value")];
        assert_eq!(require_param(&req, 0, "name").unwrap(), &json!("value"));
    }

    #[test]
    fn require_param_missing() {
        let req = RpcRequest::default();
        let err = require_param(&req, 0, "name").unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_PARAMS);
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn require_string_param_wrong_type() {
        let mut req = RpcRequest::default();
        req.params = vec![json!(42)];
        let err = require_string_param(&req, 0, "console").unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }
}
