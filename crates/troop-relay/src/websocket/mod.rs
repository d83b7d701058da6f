//! WebSocket connection state, heartbeat and the per-socket session loop.

pub mod connection;
pub mod heartbeat;
pub mod session;

/// Close code for a normal end of session.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when the server is going away or gave up on the client.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for authentication failures.
pub const CLOSE_POLICY: u16 = 1008;
