//! The blocking dispatch loop run on the interpreter thread.
//!
//! [`wait_for_method`] is entered whenever the interpreter needs input it
//! doesn't have (it is waiting for a specific client-provided method).
//! While waiting it keeps the session responsive: other requests are
//! dispatched inline through the same router background traffic uses, so
//! an RPC executed from inside the loop may itself recursively wait for
//! another method. The wait's target method is registered as a blocking
//! op for the whole duration, so the session cannot suspend mid-wait.
//!
//! [`pump_background`] is the busy-path counterpart: called by the
//! interpreter's own evaluation loop while it is executing, it services
//! at most one non-wait connection per (throttled) invocation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use hearth_events::ClientEvent;
use hearth_rpc::{method_from_uri, RpcRequest, RpcResponse, CLIENT_INIT};

use crate::context::SessionContext;
use crate::errors::SessionError;
use crate::router::ConnectionType;

/// Block until the client sends `method`, dispatching everything else
/// inline.
///
/// `allow_suspend` is the safe-point predicate handed to the suspend
/// controller; `init` runs each time a `client_init` arrives mid-wait
/// (the client reloaded and must be re-told what we are waiting for).
///
/// Returns the parsed request for `method`, or
/// [`SessionError::ShuttingDown`] once shutdown is initiated. May not
/// return at all if a suspension completes.
pub fn wait_for_method(
    ctx: &Arc<SessionContext>,
    method: &str,
    allow_suspend: &dyn Fn() -> bool,
    init: &dyn Fn(&SessionContext),
) -> Result<RpcRequest, SessionError> {
    ctx.register_wait_method(method);
    let _blocking = ctx.suspend.ops().register(method);
    let poll = Duration::from_millis(ctx.settings.dispatch.queue_poll_ms);

    loop {
        if ctx.shutdown.is_cancelled() {
            return Err(SessionError::ShuttingDown);
        }

        // suspend check: a completed suspend exits the process and never
        // returns here
        let _ = ctx
            .suspend
            .poll(allow_suspend, ctx.disconnected_timed_out());

        // an active child process counts as activity
        if ctx.children.has_active() {
            ctx.suspend.record_activity();
        }

        let connection = ctx.main_queue.dequeue(poll);

        // idle processing and completions queued from async work
        ctx.run_pending_completions();

        let Some(mut connection) = connection else {
            continue;
        };
        ctx.suspend.record_activity();

        // client re-initialization is answered without satisfying the wait
        if method_from_uri(connection.uri()) == Some(CLIENT_INIT) {
            ctx.router.handle_client_init(&mut connection);
            init(ctx);
            continue;
        }

        if method_from_uri(connection.uri()) == Some(method) {
            let Some(request) = ctx.router.parse_and_validate(&mut connection) else {
                continue;
            };
            let ack = RpcResponse::result(Value::Null)
                .with_events_pending(ctx.events.has_events());
            if let Err(error) = connection.send_rpc_response(ack) {
                debug!(%error, method, "wait acknowledgement not delivered");
            }
            return Ok(request);
        }

        // another request type: dispatch it and keep waiting
        ctx.router
            .route_connection(connection, ConnectionType::Foreground);
    }
}

/// [`wait_for_method`] announcing itself with `init_event`.
///
/// The event is queued before waiting and re-queued on every mid-wait
/// `client_init` (followed by a busy event when the interpreter is
/// executing, so a freshly reloaded client renders the right state).
pub fn wait_for_method_with_event(
    ctx: &Arc<SessionContext>,
    method: &str,
    init_event: ClientEvent,
    allow_suspend: &dyn Fn() -> bool,
) -> Result<RpcRequest, SessionError> {
    ctx.events.add(init_event.clone());
    let init = move |ctx: &SessionContext| {
        ctx.events.add(init_event.clone());
        if ctx.exec.is_executing() {
            ctx.events.add(ClientEvent::busy(true));
        }
    };
    wait_for_method(ctx, method, allow_suspend, &init)
}

/// Service background traffic while the interpreter is evaluating.
///
/// Throttled; touches only the head of the line, and leaves
/// wait-for-method URIs for the wait loop. `client_init` arriving
/// mid-computation is answered with a busy event.
pub fn pump_background(ctx: &Arc<SessionContext>) {
    let throttle = Duration::from_millis(ctx.settings.dispatch.pump_throttle_ms);
    if !ctx.pump_due(throttle) {
        return;
    }
    // only needed while evaluating; otherwise wait_for_method owns the queue
    if !ctx.exec.is_executing() {
        return;
    }
    let Some(uri) = ctx.main_queue.peek_next_uri() else {
        return;
    };
    if ctx.is_wait_method_uri(&uri) {
        return;
    }
    let Some(mut connection) = ctx.main_queue.try_dequeue() else {
        return;
    };
    if method_from_uri(connection.uri()) == Some(CLIENT_INIT) {
        // the browser reloaded in the middle of a computation
        ctx.router.handle_client_init(&mut connection);
        ctx.events.add(ClientEvent::busy(true));
    } else {
        ctx.router
            .route_connection(connection, ConnectionType::Background);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_connection, make_context, recv_json};
    use hearth_events::EventType;
    use serde_json::json;

    fn rpc_body(method: &str, client_id: &str) -> String {
        serde_json::to_string(&json!({"method": method, "clientId": client_id})).unwrap()
    }

    fn allow() -> bool {
        true
    }

    fn no_init(_: &SessionContext) {}

    #[test]
    fn wait_returns_target_request() {
        let ctx = make_context();
        let client = ctx.identity.rotate();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };

        let body = serde_json::to_string(&json!({
            "method": "console_input", "params": ["1 + 1"], "clientId": client,
        }))
        .unwrap();
        let (conn, rx) = make_connection("/rpc/console_input", &body);
        ctx.main_queue.enqueue(conn);

        let request = waiter.join().unwrap().unwrap();
        assert_eq!(request.method, "console_input");
        assert_eq!(request.params[0], "1 + 1");

        let ack = recv_json(rx);
        assert!(ack["result"].is_null());
        assert!(ack.get("error").is_none());
    }

    #[test]
    fn non_target_requests_dispatch_inline_without_ending_wait() {
        let ctx = make_context();
        let client = ctx.identity.rotate();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };

        let (ping, ping_rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);
        let ping_response = recv_json(ping_rx);
        assert_eq!(ping_response["result"], true);

        // the wait is still alive: satisfy it now
        let (target, _target_rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(target);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn client_init_is_answered_without_ending_wait() {
        let ctx = make_context();
        let _old_client = ctx.identity.rotate();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };

        let (init_conn, init_rx) = make_connection("/rpc/client_init", "{}");
        ctx.main_queue.enqueue(init_conn);
        let init_response = recv_json(init_rx);
        let new_client = init_response["result"]["clientId"].as_str().unwrap().to_string();

        // the wait survived re-initialization; the new identity satisfies it
        let (target, _rx) = make_connection(
            "/rpc/console_input",
            &rpc_body("console_input", &new_client),
        );
        ctx.main_queue.enqueue(target);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn wait_registers_blocking_op_for_duration() {
        let ctx = make_context();
        let client = ctx.identity.rotate();
        assert!(ctx.suspend.ops().is_empty());

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };

        // present for the entire wait
        while !ctx.suspend.ops().contains("console_input") {
            std::thread::sleep(Duration::from_millis(1));
        }

        let (target, _rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(target);
        waiter.join().unwrap().unwrap();

        // absent immediately after
        assert!(ctx.suspend.ops().is_empty());
    }

    #[test]
    fn shutdown_ends_wait() {
        let ctx = make_context();
        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };
        ctx.shutdown.cancel();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(SessionError::ShuttingDown)
        ));
    }

    #[test]
    fn invalid_target_request_keeps_waiting() {
        let ctx = make_context();
        let client = ctx.identity.rotate();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method(&ctx, "console_input", &allow, &no_init)
            })
        };

        // wrong client id: answered with an error, wait continues
        let (bad, bad_rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", "intruder"));
        ctx.main_queue.enqueue(bad);
        assert_eq!(recv_json(bad_rx)["error"]["code"], "INVALID_CLIENT_ID");

        let (good, _rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(good);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn wait_with_event_announces_itself() {
        let ctx = make_context();
        let client = ctx.identity.rotate();

        let waiter = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                wait_for_method_with_event(
                    &ctx,
                    "console_input",
                    ClientEvent::new(EventType::Busy, json!({"busy": false})),
                    &allow,
                )
            })
        };

        let (target, _rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(target);
        waiter.join().unwrap().unwrap();

        let mut out = Vec::new();
        ctx.events.drain(&mut out);
        assert!(out.iter().any(|e| e.event_type == EventType::Busy));
    }

    // ── Busy-path pump ──────────────────────────────────────────────

    #[test]
    fn pump_services_one_background_connection() {
        let ctx = make_context();
        let client = ctx.identity.rotate();
        ctx.exec.set_executing(true);

        let (ping, rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);

        pump_background(&ctx);
        assert_eq!(recv_json(rx)["result"], true);
        assert!(ctx.main_queue.is_empty());
    }

    #[test]
    fn pump_skips_wait_method_head_of_line() {
        let ctx = make_context();
        let client = ctx.identity.rotate();
        ctx.exec.set_executing(true);
        ctx.register_wait_method("console_input");

        let (target, _rx) =
            make_connection("/rpc/console_input", &rpc_body("console_input", &client));
        ctx.main_queue.enqueue(target);

        pump_background(&ctx);
        // left for the wait loop
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn pump_is_noop_when_interpreter_idle() {
        let ctx = make_context();
        let client = ctx.identity.rotate();
        let (ping, _rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(ping);

        pump_background(&ctx);
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn pump_is_throttled() {
        let ctx = make_context();
        let client = ctx.identity.rotate();
        ctx.exec.set_executing(true);

        let (first, first_rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        let (second, _second_rx) = make_connection("/rpc/ping", &rpc_body("ping", &client));
        ctx.main_queue.enqueue(first);
        ctx.main_queue.enqueue(second);

        pump_background(&ctx);
        assert_eq!(recv_json(first_rx)["result"], true);
        // second call lands inside the throttle window
        pump_background(&ctx);
        assert_eq!(ctx.main_queue.len(), 1);
    }

    #[test]
    fn pump_answers_client_init_with_busy_event() {
        let ctx = make_context();
        ctx.exec.set_executing(true);

        let (init_conn, rx) = make_connection("/rpc/client_init", "{}");
        ctx.main_queue.enqueue(init_conn);

        pump_background(&ctx);
        let response = recv_json(rx);
        assert!(response["result"]["clientId"].is_string());
        assert_eq!(response["result"]["busy"], true);

        let mut out = Vec::new();
        ctx.events.drain(&mut out);
        assert!(out.iter().any(|e| e.event_type == EventType::Busy));
    }
}
