//! `HearthServer` — the axum listener over the session queues.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use serde_json::json;
use tracing::{debug, info};

use hearth_session::{Connection, ConnectionQueue, HttpRequest, HttpResponse, SessionContext};

use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session everything routes into.
    pub ctx: Arc<SessionContext>,
    /// When the server started.
    pub start_time: Instant,
}

/// The Hearth listener.
pub struct HearthServer {
    ctx: Arc<SessionContext>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
}

impl HearthServer {
    /// Create a listener over the session; its shutdown follows the
    /// session's stop token.
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let shutdown = ShutdownCoordinator::with_token(ctx.shutdown.clone());
        Self {
            ctx,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> AxumRouter {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            start_time: self.start_time,
        };
        AxumRouter::new()
            .route("/health", get(health_handler))
            .route("/rpc/{method}", post(rpc_handler))
            .route("/events/get_events", post(get_events_handler))
            .with_state(state)
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Bind and serve until the session's stop token cancels.
    pub async fn serve(&self) -> Result<(), ServerError> {
        let addr = format!(
            "{}:{}",
            self.ctx.settings.server.host, self.ctx.settings.server.port
        );
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(%local, "listening");

        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.ctx.main_queue.len(),
        state.ctx.events_queue.len(),
        state.ctx.exec.is_executing(),
    );
    Json(resp)
}

/// POST /rpc/{method}
async fn rpc_handler(
    State(state): State<AppState>,
    Path(method): Path<String>,
    body: String,
) -> Response {
    let uri = format!("/rpc/{method}");
    let queue = Arc::clone(&state.ctx.main_queue);
    enqueue_and_wait(&state, &queue, uri, body).await
}

/// POST /events/get_events
async fn get_events_handler(State(state): State<AppState>, body: String) -> Response {
    let queue = Arc::clone(&state.ctx.events_queue);
    enqueue_and_wait(&state, &queue, "/events/get_events".to_string(), body).await
}

/// The listener bridge: wrap the request into a connection, push it onto
/// `queue`, and wait for whichever thread completes it.
async fn enqueue_and_wait(
    state: &AppState,
    queue: &Arc<ConnectionQueue>,
    uri: String,
    body: String,
) -> Response {
    if body.len() > state.ctx.settings.server.max_body_bytes {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    queue.enqueue(Connection::new(HttpRequest::post(uri.clone(), body), tx));

    let timeout = Duration::from_secs(state.ctx.settings.server.request_timeout_secs);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => into_axum_response(response),
        Ok(Err(_)) => {
            debug!(%uri, "connection dropped without a response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "no response produced")
        }
        Err(_) => {
            debug!(%uri, "request timed out in queue");
            error_response(StatusCode::GATEWAY_TIMEOUT, "request timed out")
        }
    }
}

fn into_axum_response(response: HttpResponse) -> Response {
    Response::builder()
        .status(response.status)
        .header(header::CONTENT_TYPE, response.content_type)
        .body(Body::from(response.body))
        .unwrap_or_else(|_| {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "malformed response")
        })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
