//! Monitor Configuration Module
//!
//! Runtime configuration loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PD_MONITOR_CONFIG` environment variable (path to TOML file)
//! 2. `pd_monitor.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(MonitorConfig::load());
//!
//! // Anywhere in the codebase:
//! let topic = &config::get().broker.topic;
//! ```

mod monitor_config;
pub mod defaults;

pub use monitor_config::*;

use std::sync::OnceLock;

/// Global configuration, initialized once at startup.
static MONITOR_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: MonitorConfig) {
    if MONITOR_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Falls back to built-in defaults if `init()` was never called.
pub fn get() -> &'static MonitorConfig {
    MONITOR_CONFIG.get_or_init(MonitorConfig::default)
}
