//! Monitor Configuration - broker, window, timing and storage settings
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a missing file or a partial file behaves like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PD_MONITOR_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pd_monitor.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one monitoring deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// MQTT broker and topic
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Rolling window and queue sizes
    #[serde(default)]
    pub windows: WindowConfig,

    /// SQLite persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingest / dispatch tick timing
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Live WebSocket channel
    #[serde(default)]
    pub live: LiveConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// CSV export
    #[serde(default)]
    pub export: ExportConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PD_MONITOR_CONFIG`
    /// 2. `./pd_monitor.toml`
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all settings.
    ///
    /// Rules:
    /// - Window and queue capacities must be > 0
    /// - Every tick interval must be > 0
    /// - Topic and broker host must be non-empty, port non-zero
    /// - MQTT keep-alive must be at least 5 s
    /// - Live fetch/snapshot sizes must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.broker.host.trim().is_empty() {
            errors.push("broker.host must not be empty".to_string());
        }
        if self.broker.topic.trim().is_empty() {
            errors.push("broker.topic must not be empty".to_string());
        }
        if self.broker.port == 0 {
            errors.push("broker.port must be greater than zero".to_string());
        }
        if self.broker.keep_alive_secs < 5 {
            errors.push(format!(
                "broker.keep_alive_secs ({}) must be at least 5",
                self.broker.keep_alive_secs
            ));
        }

        Self::check_nonzero(self.windows.accumulation_cycles as u64, "windows.accumulation_cycles", &mut errors);
        Self::check_nonzero(self.windows.surface_cycles as u64, "windows.surface_cycles", &mut errors);
        Self::check_nonzero(self.windows.queue_capacity as u64, "windows.queue_capacity", &mut errors);
        Self::check_nonzero(self.storage.raw_channel_capacity as u64, "storage.raw_channel_capacity", &mut errors);

        Self::check_nonzero(self.dispatch.ingest_poll_ms, "dispatch.ingest_poll_ms", &mut errors);
        Self::check_nonzero(self.dispatch.drain_interval_ms, "dispatch.drain_interval_ms", &mut errors);
        Self::check_nonzero(self.dispatch.render_interval_ms, "dispatch.render_interval_ms", &mut errors);
        Self::check_nonzero(self.dispatch.status_interval_secs, "dispatch.status_interval_secs", &mut errors);
        Self::check_nonzero(self.live.tick_ms, "live.tick_ms", &mut errors);

        if self.live.fetch_limit <= 0 {
            errors.push(format!("live.fetch_limit ({}) must be positive", self.live.fetch_limit));
        }
        if self.live.snapshot_count <= 0 {
            errors.push(format!("live.snapshot_count ({}) must be positive", self.live.snapshot_count));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_nonzero(value: u64, name: &str, errors: &mut Vec<String>) {
        if value == 0 {
            errors.push(format!("{} must be greater than zero", name));
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Connect on startup (otherwise wait for `POST /api/connection`)
    pub auto_connect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: defaults::BROKER_HOST.to_string(),
            port: defaults::BROKER_PORT,
            topic: defaults::BROKER_TOPIC.to_string(),
            client_id: "gis-pd-monitor".to_string(),
            keep_alive_secs: defaults::BROKER_KEEP_ALIVE_SECS,
            auto_connect: true,
        }
    }
}

/// Rolling window and queue capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// PRPD accumulation window (also the cycle counter's ceiling)
    pub accumulation_cycles: usize,
    /// PRPS surface window
    pub surface_cycles: usize,
    /// Ingest queue slots
    pub queue_capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            accumulation_cycles: defaults::ACCUMULATION_CYCLES,
            surface_cycles: defaults::SURFACE_CYCLES,
            queue_capacity: defaults::INGEST_QUEUE_CAPACITY,
        }
    }
}

/// SQLite persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Persist cycles and raw frames (toggle at runtime via the API)
    pub persist_enabled: bool,
    pub raw_channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(defaults::DB_PATH),
            persist_enabled: false,
            raw_channel_capacity: defaults::RAW_FRAME_CHANNEL_CAPACITY,
        }
    }
}

/// Ingest and dispatch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub ingest_poll_ms: u64,
    pub stop_timeout_ms: u64,
    pub drain_interval_ms: u64,
    pub render_interval_ms: u64,
    pub status_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ingest_poll_ms: defaults::INGEST_POLL_MS,
            stop_timeout_ms: defaults::INGEST_STOP_TIMEOUT_MS,
            drain_interval_ms: defaults::DISPATCH_DRAIN_MS,
            render_interval_ms: defaults::RENDER_INTERVAL_MS,
            status_interval_secs: defaults::STATUS_INTERVAL_SECS,
        }
    }
}

impl DispatchConfig {
    pub fn ingest_poll(&self) -> Duration {
        Duration::from_millis(self.ingest_poll_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

/// Live channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub tick_ms: u64,
    pub fetch_limit: i64,
    pub snapshot_count: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick_ms: defaults::LIVE_TICK_MS,
            fetch_limit: defaults::LIVE_FETCH_LIMIT,
            snapshot_count: defaults::LIVE_SNAPSHOT_COUNT,
        }
    }
}

impl LiveConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

/// CSV export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub csv_cycles: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            csv_cycles: defaults::CSV_EXPORT_CYCLES,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}
