//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production default values. Types marked with
//! `#[serde(default)]` allow partial JSON — missing fields get their
//! default value during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for the Hearth session daemon.
///
/// Loaded from `~/.hearth/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HearthSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Listener network settings.
    pub server: ServerSettings,
    /// Dispatch-loop timing and timeout settings.
    pub dispatch: DispatchSettings,
    /// Event delivery settings.
    pub events: EventSettings,
    /// Offline background execution settings.
    pub offline: OfflineSettings,
    /// Suspension settings.
    pub suspend: SuspendSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for HearthSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "hearth".to_string(),
            server: ServerSettings::default(),
            dispatch: DispatchSettings::default(),
            events: EventSettings::default(),
            offline: OfflineSettings::default(),
            suspend: SuspendSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Listener network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Server-side cap on how long a queued request may wait for its
    /// response before the listener gives up, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            request_timeout_secs: 300,
            max_body_bytes: 4 * 1024 * 1024, // 4 MB
        }
    }
}

/// Dispatch-loop timing and timeout settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Idle minutes before the session attempts a timeout suspend.
    /// `0` disables the idle timeout.
    pub idle_timeout_minutes: u64,
    /// Minutes without a long-poll connection before the session counts as
    /// disconnected and eligible for timeout suspend. `0` disables.
    pub disconnected_timeout_minutes: u64,
    /// Connection-queue poll interval inside the dispatch loop, in ms.
    pub queue_poll_ms: u64,
    /// Minimum interval between busy-path background pump runs, in ms.
    pub pump_throttle_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 120,
            disconnected_timeout_minutes: 180,
            queue_poll_ms: 50,
            pump_throttle_ms: 50,
        }
    }
}

/// Event delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// How long the event service blocks on its accept queue per loop, in
    /// seconds.
    pub accept_wait_secs: u64,
    /// Last-chance accept wait after a stop request, in ms.
    pub last_chance_wait_ms: u64,
    /// Hard maximum a long-poll connection waits for the first event, in
    /// seconds.
    pub long_poll_max_wait_secs: u64,
    /// Debounce window: a batch stays open while further events keep
    /// arriving within this many ms of each other.
    pub debounce_ms: u64,
    /// Upper bound on total batching delay once the first event is in, in
    /// ms.
    pub max_batch_delay_ms: u64,
    /// Maximum delivered-but-unacknowledged events retained for re-send.
    pub max_delivered_retained: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            accept_wait_secs: 5,
            last_chance_wait_ms: 1_000,
            long_poll_max_wait_secs: 50,
            debounce_ms: 50,
            max_batch_delay_ms: 500,
            max_delivered_retained: 500,
        }
    }
}

/// Offline background execution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfflineSettings {
    /// Service wake interval, in ms.
    pub interval_ms: u64,
    /// Minimum age before an allow-listed request is executed offline, in
    /// ms.
    pub offline_threshold_ms: u64,
    /// Minimum age before an ordinary RPC is promoted to async completion,
    /// in ms.
    pub async_promotion_ms: u64,
    /// Interval between memory-usage events, in seconds. `0` disables.
    pub memory_event_interval_secs: u64,
    /// Method names safe to execute without the interpreter.
    pub allow_list: Vec<String>,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            offline_threshold_ms: 300,
            async_promotion_ms: 150,
            memory_event_interval_secs: 10,
            allow_list: vec![
                "ping".into(),
                "session_status".into(),
                "set_active_console".into(),
            ],
        }
    }
}

/// Suspension settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuspendSettings {
    /// Delay before notifying the client that a blocking op is deferring
    /// suspension, in seconds.
    pub notify_delay_secs: u64,
}

impl Default for SuspendSettings {
    fn default() -> Self {
        Self { notify_delay_secs: 5 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}
