//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct carries
//! `#[serde(default)]` so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TroopSettings {
    /// Network binding.
    pub server: ServerSettings,
    /// Relay tuning.
    pub relay: RelaySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TroopSettings {
    /// Check cross-field rules that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let relay = &self.relay;
        if relay.heartbeat_timeout_ms < relay.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "relay.heartbeatTimeoutMs ({}) must be >= relay.heartbeatIntervalMs ({})",
                relay.heartbeat_timeout_ms, relay.heartbeat_interval_ms
            )));
        }
        if relay.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if relay.max_message_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.maxMessageChars must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Network binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Upper bound on concurrent WebSocket connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4100,
            max_connections: 2_000,
        }
    }
}

/// Relay tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Outbound frames buffered per connection before it counts as stalled.
    pub send_queue_capacity: usize,
    /// Deadline for one socket write.
    pub write_timeout_ms: u64,
    /// How long a new socket may stay unauthenticated.
    pub auth_timeout_ms: u64,
    /// Interval between server pings.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a client is dropped.
    pub heartbeat_timeout_ms: u64,
    /// Longest accepted chat message, in characters.
    pub max_message_chars: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,
    /// How long shutdown waits for sessions to finish cleanup.
    pub shutdown_timeout_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
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

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable compact lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive (`info`, `debug`, `troop_relay=trace`, ...).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
