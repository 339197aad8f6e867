//! # hearthd
//!
//! Hearth session daemon binary — wires the dispatch core together and
//! serves it: settings, logging, the session context, the event and
//! offline service threads, the interpreter thread, signal handling, and
//! the HTTP listener.

#![deny(unsafe_code)]

mod interpreter;
mod lifecycle;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_core::SessionControl;
use hearth_rpc::MethodRegistry;
use hearth_server::HearthServer;
use hearth_session::{EventService, OfflineService, SessionContext};

use crate::interpreter::EchoInterpreter;
use crate::lifecycle::{FileSuspendHandler, ProcessControl};

/// Hearth session daemon.
#[derive(Parser, Debug)]
#[command(name = "hearthd", about = "Hearth interpreter session daemon")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path the suspend snapshot is written to.
    #[arg(long)]
    state_path: Option<PathBuf>,
}

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join(".hearth")
        .join("suspended-session.json")
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
fn spawn_signal_listeners(ctx: &Arc<SessionContext>) {
    use tokio::signal::unix::{signal, SignalKind};

    // SIGUSR1: cooperative suspend, honored at the next safe point
    let signals = Arc::clone(&ctx.signals);
    let _ = tokio::spawn(async move {
        let Ok(mut usr1) = signal(SignalKind::user_defined1()) else {
            return;
        };
        while usr1.recv().await.is_some() {
            signals.request_cooperative();
        }
    });

    // SIGUSR2: forced suspend, bypasses blocking ops
    let signals = Arc::clone(&ctx.signals);
    let _ = tokio::spawn(async move {
        let Ok(mut usr2) = signal(SignalKind::user_defined2()) else {
            return;
        };
        while usr2.recv().await.is_some() {
            signals.request_forced();
        }
    });

    let token = ctx.shutdown.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_listeners(ctx: &Arc<SessionContext>) {
    let token = ctx.shutdown.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // settings before logging so the configured level applies from the
    // first line
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(hearth_settings::settings_path);
    let mut settings = hearth_settings::load_settings_from_path(&settings_path)
        .context("Failed to load settings")?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    init_logging(&settings.logging.level);

    let state_path = args.state_path.unwrap_or_else(default_state_path);
    ensure_parent_dir(&state_path)?;

    let mut registry = MethodRegistry::new();
    hearth_rpc::handlers::register_builtin(&mut registry);

    let control = Arc::new(ProcessControl::new());
    let ctx = SessionContext::new(
        settings,
        registry,
        Arc::clone(&control) as Arc<dyn SessionControl>,
        Arc::new(FileSuspendHandler::new(state_path)),
    );
    control.bind(ctx.shutdown.clone());

    // background services; a spawn failure is fatal at startup
    let event_service = EventService::new(Arc::clone(&ctx), ctx.shutdown.clone());
    let event_thread = event_service
        .start()
        .context("Failed to start event service")?;
    let offline_thread = OfflineService::new(Arc::clone(&ctx), ctx.shutdown.clone())
        .start()
        .context("Failed to start offline service")?;

    // the one thread allowed to touch the interpreter
    let interpreter_thread = {
        let ctx = Arc::clone(&ctx);
        std::thread::Builder::new()
            .name("interpreter".into())
            .spawn(move || interpreter::run_loop(&ctx, EchoInterpreter::new()))
            .context("Failed to start interpreter thread")?
    };

    spawn_signal_listeners(&ctx);

    let server = HearthServer::new(Arc::clone(&ctx));
    let served = server.serve().await;

    info!("listener stopped, draining service threads");
    server
        .shutdown()
        .graceful_shutdown(
            vec![
                ("event-service", event_thread),
                ("offline-service", offline_thread),
                ("interpreter", interpreter_thread),
            ],
            None,
        )
        .await;

    served.context("Server failed")
}
