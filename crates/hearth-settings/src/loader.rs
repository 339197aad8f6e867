//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HearthSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::HearthSettings;

/// Resolve the path to the settings file (`~/.hearth/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hearth").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HearthSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<HearthSettings> {
    let defaults = serde_json::to_value(HearthSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HearthSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut HearthSettings) {
    // ── Server settings ─────────────────────────────────────────────
    if let Some(v) = read_env_string("HEARTH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("HEARTH_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u64("HEARTH_REQUEST_TIMEOUT_SECS", 1, 3_600) {
        settings.server.request_timeout_secs = v;
    }

    // ── Dispatch settings ───────────────────────────────────────────
    if let Some(v) = read_env_u64("HEARTH_IDLE_TIMEOUT_MINUTES", 0, 10_080) {
        settings.dispatch.idle_timeout_minutes = v;
    }
    if let Some(v) = read_env_u64("HEARTH_DISCONNECTED_TIMEOUT_MINUTES", 0, 10_080) {
        settings.dispatch.disconnected_timeout_minutes = v;
    }

    // ── Event settings ──────────────────────────────────────────────
    if let Some(v) = read_env_u64("HEARTH_EVENT_DEBOUNCE_MS", 1, 10_000) {
        settings.events.debounce_ms = v;
    }
    if let Some(v) = read_env_u64("HEARTH_EVENT_MAX_BATCH_DELAY_MS", 1, 60_000) {
        settings.events.max_batch_delay_ms = v;
    }

    // ── Offline settings ────────────────────────────────────────────
    if let Some(v) = read_env_u64("HEARTH_OFFLINE_THRESHOLD_MS", 1, 60_000) {
        settings.offline.offline_threshold_ms = v;
    }
    if let Some(v) = read_env_u64("HEARTH_ASYNC_PROMOTION_MS", 1, 60_000) {
        settings.offline.async_promotion_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("HEARTH_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    parse_u16_range(&std::env::var(name).ok()?, min, max)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    parse_u64_range(&std::env::var(name).ok()?, min, max)
}
