//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! Each socket gets a reader (this task), a writer task that drains the
//! connection's outbound queue and pings on a schedule, and a heartbeat task
//! that watches for silence. Whatever ends the session, the reader runs
//! [`LifecycleManager::disconnect`](crate::lifecycle::LifecycleManager::disconnect)
//! before returning.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::{CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY};
use crate::config::ServerConfig;
use crate::errors::{AuthenticationError, RelayError};
use crate::hub::RelayHub;
use crate::metrics::{
    SESSION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::shutdown::SessionGuard;

/// Run one WebSocket session.
///
/// 1. Waits up to `auth_timeout` for an `authenticate` frame; anything else
///    closes the socket with 1008
/// 2. Dispatches inbound events to the handlers, reporting errors back on
///    the same socket
/// 3. Ends on close frame, read error, heartbeat timeout, write failure,
///    eviction by the router or server shutdown
/// 4. Always runs disconnect cleanup
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<RelayHub>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    guard: SessionGuard,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(send_tx, shutdown.child_token()));
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&connection.id));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        shutdown,
        config.heartbeat_interval(),
        config.write_timeout(),
    ));

    let heartbeat_conn = connection.clone();
    let (interval, timeout) = (config.heartbeat_interval(), config.heartbeat_timeout());
    let heartbeat = tokio::spawn(async move {
        let cancel = heartbeat_conn.cancel_token().clone();
        if run_heartbeat(heartbeat_conn.clone(), interval, timeout, cancel).await == HeartbeatResult::TimedOut {
            warn!(
                conn_id = %heartbeat_conn.id,
                silent_ms = heartbeat_conn.last_pong_elapsed().as_millis(),
                "client unresponsive, disconnecting"
            );
            heartbeat_conn.close_with(CLOSE_GOING_AWAY, "heartbeat timeout");
        }
    });

    let reason = match authenticate(&mut ws_rx, &connection, &hub, &config).await {
        Ok(()) => dispatch_loop(&mut ws_rx, &connection, &hub).await,
        Err(AuthenticationError::ConnectionClosed) => "closed_before_auth",
        Err(err) => {
            let _ = connection.send_event(&OutboundEvent::error(&RelayError::from(err.clone())));
            connection.close_with(CLOSE_POLICY, err.to_string());
            "auth_failed"
        }
    };

    let _ = hub.lifecycle.disconnect(&connection).await;
    if tokio::time::timeout(config.write_timeout(), writer).await.is_err() {
        debug!("writer did not finish in time");
    }
    heartbeat.abort();

    info!(
        reason,
        dropped = connection.drop_count(),
        duration_ms = connection.age().as_millis(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(SESSION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    drop(guard);
}

/// Wait for the first frame and run it through the lifecycle manager.
async fn authenticate(
    ws_rx: &mut SplitStream<WebSocket>,
    connection: &Arc<ClientConnection>,
    hub: &RelayHub,
    config: &ServerConfig,
) -> Result<(), AuthenticationError> {
    let cancel = connection.cancel_token().clone();
    let first = tokio::select! {
        () = cancel.cancelled() => return Err(AuthenticationError::ConnectionClosed),
        first = tokio::time::timeout(config.auth_timeout(), next_text(ws_rx, connection)) => first,
    };
    let text = match first {
        Err(_) => return Err(AuthenticationError::Timeout),
        Ok(None) => return Err(AuthenticationError::ConnectionClosed),
        Ok(Some(text)) => text,
    };
    match InboundEvent::parse(&text) {
        Ok(InboundEvent::Authenticate(claim)) => hub.lifecycle.connect(connection, &claim).await.map(|_| ()),
        Ok(other) => {
            debug!(kind = other.kind(), "event before authenticate");
            Err(AuthenticationError::NotAuthenticated)
        }
        Err(err) => {
            debug!(error = %err, "malformed first frame");
            Err(AuthenticationError::NotAuthenticated)
        }
    }
}

/// Handle inbound events until the socket or the session ends. Returns the
/// disconnect reason label.
async fn dispatch_loop(
    ws_rx: &mut SplitStream<WebSocket>,
    connection: &Arc<ClientConnection>,
    hub: &RelayHub,
) -> &'static str {
    let cancel = connection.cancel_token().clone();
    loop {
        let text = tokio::select! {
            () = cancel.cancelled() => return "cancelled",
            text = next_text(ws_rx, connection) => match text {
                Some(text) => text,
                None => return "client_closed",
            },
        };

        let result = match InboundEvent::parse(&text) {
            Ok(event) => hub.handlers.handle(connection, event).await.map(|_| ()),
            Err(err) => Err(RelayError::from(err)),
        };
        if let Err(err) = result {
            let _ = connection.send_event(&OutboundEvent::error(&err));
        }
    }
}

/// Next text payload. Every frame counts as client activity. `None` once
/// the client closes or the stream errors.
async fn next_text(ws_rx: &mut SplitStream<WebSocket>, connection: &ClientConnection) -> Option<String> {
    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(err) => {
                debug!(error = %err, "websocket read error");
                return None;
            }
        };
        connection.mark_alive();
        match msg {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => return Some(text.to_owned()),
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                return None;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    None
}

/// Drain the outbound queue into the socket, ping every `ping_interval`, and
/// finish with a close frame once the connection is cancelled.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    shutdown: CancellationToken,
    ping_interval: Duration,
    write_timeout: Duration,
) {
    let cancel = connection.cancel_token().clone();
    let mut ping = tokio::time::interval(ping_interval);
    // First tick is immediate.
    let _ = ping.tick().await;

    loop {
        let msg = tokio::select! {
            biased;
            frame = send_rx.recv() => match frame {
                Some(frame) => Message::Text(frame.as_str().into()),
                None => break,
            },
            () = cancel.cancelled() => break,
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };
        if !send_with_timeout(&mut ws_tx, msg, write_timeout, &connection).await {
            connection.cancel();
            return;
        }
    }

    let (code, reason) = match connection.close_reason() {
        Some(close) => (close.code, close.reason),
        None if shutdown.is_cancelled() => (CLOSE_GOING_AWAY, "server shutting down".to_owned()),
        None => (CLOSE_NORMAL, String::new()),
    };
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    let _ = send_with_timeout(&mut ws_tx, frame, write_timeout, &connection).await;
    connection.cancel();
}

async fn send_with_timeout(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    write_timeout: Duration,
    connection: &ClientConnection,
) -> bool {
    match tokio::time::timeout(write_timeout, ws_tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(conn_id = %connection.id, error = %err, "websocket write failed");
            false
        }
        Err(_) => {
            warn!(conn_id = %connection.id, timeout_ms = write_timeout.as_millis(), "websocket write timed out");
            false
        }
    }
}
