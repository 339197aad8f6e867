//! # hearth-settings
//!
//! Layered configuration for the Hearth session daemon.
//!
//! Loading flow:
//! 1. Start with compiled [`HearthSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `HEARTH_*` environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{
    DispatchSettings, EventSettings, HearthSettings, LoggingSettings, OfflineSettings,
    ServerSettings, SuspendSettings,
};
