//! Settings types.
//!
//! All structs use `#[serde(default)]` so a settings file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PosestreamSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Per-session frame processing settings.
    pub processing: ProcessingSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl PosestreamSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.processing.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "processing.queueCapacity must be at least 1".into(),
            ));
        }
        if self.server.max_sessions == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSessions must be at least 1".into(),
            ));
        }
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutMs must not be shorter than heartbeatIntervalMs".into(),
            ));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrently registered sessions.
    pub max_sessions: usize,
    /// Outbound messages buffered per client before sends wait.
    pub outbound_buffer: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a client is considered gone, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Grace period for session tasks on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_sessions: 50,
            outbound_buffer: 64,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 45_000,
            max_message_size: 8 * 1024 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Frame processing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    /// Pending frames held per session before the oldest is dropped.
    pub queue_capacity: usize,
    /// Detector backend name.
    pub detector: String,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 2,
            detector: "null".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
