//! Runtime configuration for the relay server.

use std::time::Duration;

use troop_settings::TroopSettings;

/// Relay server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Deadline for one socket write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Deadline for the `authenticate` frame, in milliseconds.
    pub auth_timeout_ms: u64,
    /// Ping interval, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence before a client is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,
    /// Drain window on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 2_000,
            send_queue_capacity: 256,
            write_timeout_ms: 5_000,
            auth_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_chars: 4_000,
            max_frame_bytes: 64 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &TroopSettings) -> Self {
        let relay = &settings.relay;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            send_queue_capacity: relay.send_queue_capacity,
            write_timeout_ms: relay.write_timeout_ms,
            auth_timeout_ms: relay.auth_timeout_ms,
            heartbeat_interval_ms: relay.heartbeat_interval_ms,
            heartbeat_timeout_ms: relay.heartbeat_timeout_ms,
            max_message_chars: relay.max_message_chars,
            max_frame_bytes: relay.max_frame_bytes,
            shutdown_timeout_ms: relay.shutdown_timeout_ms,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Authentication deadline.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    /// Ping interval. Never zero.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Silence limit.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Shutdown drain window.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
