//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the posestream server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently registered sessions.
    pub max_sessions: usize,
    /// Pending frames per session before drop-oldest kicks in.
    pub queue_capacity: usize,
    /// Outbound messages buffered per client.
    pub outbound_buffer: usize,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout in milliseconds (drain after this much silence).
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for session tasks, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Heartbeat interval as a [`Duration`], never shorter than 1ms.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// `host:port` bind string.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_sessions: 50,
            queue_capacity: 2,
            outbound_buffer: 64,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 45_000,
            max_message_size: 8 * 1024 * 1024, // 8 MB
            shutdown_timeout_ms: 5_000,
        }
    }
}
