//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Sockets accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "relay_ws_connections_total";
/// Sockets closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "relay_ws_disconnections_total";
/// Open sockets (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "relay_ws_connections_active";
/// Upgrades refused because the server was full (counter).
pub const WS_REJECTED_TOTAL: &str = "relay_ws_rejected_total";
/// Authentication failures (counter).
pub const AUTH_FAILURES_TOTAL: &str = "relay_auth_failures_total";
/// Online users (gauge).
pub const PRESENCE_ONLINE_USERS: &str = "relay_presence_online_users";
/// Inbound events handled (counter, labels: kind).
pub const EVENTS_INBOUND_TOTAL: &str = "relay_events_inbound_total";
/// Inbound events rejected (counter, labels: kind, code).
pub const EVENTS_FAILED_TOTAL: &str = "relay_events_failed_total";
/// Frames handed to subscriber queues (counter, labels: kind).
pub const FRAMES_DELIVERED_TOTAL: &str = "relay_frames_delivered_total";
/// Frames that could not be queued (counter, labels: kind).
pub const FRAMES_DROPPED_TOTAL: &str = "relay_frames_dropped_total";
/// Socket lifetime in seconds (histogram).
pub const SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
