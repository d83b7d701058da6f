//! Per-socket connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use troop_core::{ConnectionId, UserId, UserIdentity};

use crate::errors::DeliveryError;
use crate::protocol::OutboundEvent;

/// Lifecycle of one socket.
///
/// `Connecting → Authenticated → Active → Closed`; any state may jump to
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, waiting for `authenticate`.
    Connecting,
    /// Identity established, not yet in any topic.
    Authenticated,
    /// Joined to its topics and registered as present.
    Active,
    /// Torn down.
    Closed,
}

impl ConnectionState {
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticated)
                | (Self::Authenticated, Self::Active)
                | (Self::Connecting | Self::Authenticated | Self::Active, Self::Closed)
        )
    }
}

/// Close frame the writer sends when the connection is cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Reason text.
    pub reason: String,
}

/// One connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection id.
    pub id: ConnectionId,
    identity: OnceLock<UserIdentity>,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Arc<String>>,
    started: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a connection with a fresh id.
    pub fn new(tx: mpsc::Sender<Arc<String>>, cancel: CancellationToken) -> Self {
        Self::with_id(ConnectionId::new(), tx, cancel)
    }

    /// Create a connection with a known id.
    pub fn with_id(
        id: ConnectionId,
        tx: mpsc::Sender<Arc<String>>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: OnceLock::new(),
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            started: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close_reason: Mutex::new(None),
            cancel,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.can_advance_to(next) {
            *state = next;
            true
        } else {
            warn!(conn_id = %self.id, from = ?*state, to = ?next, "illegal connection transition ignored");
            false
        }
    }

    /// Attach the authenticated identity. Fails unless `Connecting`.
    pub fn authenticate(&self, identity: UserIdentity) -> bool {
        if !self.advance(ConnectionState::Authenticated) {
            return false;
        }
        self.identity.set(identity).is_ok()
    }

    /// Mark the connection as joined and present. Fails unless `Authenticated`.
    pub fn activate(&self) -> bool {
        self.advance(ConnectionState::Active)
    }

    /// Move to `Closed` and cancel the session. Returns `false` when already
    /// closed.
    pub fn close(&self) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        };
        self.cancel.cancel();
        changed
    }

    /// Ask the session to end, sending `code`/`reason` in the close frame.
    /// The first reason wins.
    pub fn close_with(&self, code: u16, reason: impl Into<String>) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(CloseReason {
                    code,
                    reason: reason.into(),
                });
            }
        }
        self.cancel.cancel();
    }

    /// Close frame to send, if one was requested.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().clone()
    }

    /// Ask the session driving this connection to end.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the connection should end.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Authenticated identity.
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.get()
    }

    /// Authenticated user.
    pub fn user_id(&self) -> Option<&UserId> {
        self.identity.get().map(|identity| &identity.user_id)
    }

    /// Enqueue a frame without waiting.
    ///
    /// A full queue means the client is not draining; a closed one means the
    /// writer task is gone. Either way the frame is counted as dropped.
    pub fn send(&self, frame: Arc<String>) -> Result<(), DeliveryError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                match err {
                    TrySendError::Full(_) => Err(DeliveryError::QueueFull),
                    TrySendError::Closed(_) => Err(DeliveryError::Closed),
                }
            }
        }
    }

    /// Encode and enqueue one event for this connection only.
    pub fn send_event(&self, event: &OutboundEvent) -> Result<(), DeliveryError> {
        match event.encode() {
            Ok(frame) => self.send(frame),
            Err(err) => {
                warn!(conn_id = %self.id, kind = event.kind(), error = %err, "failed to encode event");
                Err(DeliveryError::Closed)
            }
        }
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Read and clear the alive flag. `true` if there was activity since the
    /// previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last client activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Time since the socket was accepted.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
