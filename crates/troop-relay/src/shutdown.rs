//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Every WebSocket session holds a [`SessionGuard`]. Shutdown cancels the
//! root token, each session's child token fires, the session runs its normal
//! disconnect cleanup and drops its guard. [`ShutdownCoordinator::graceful_shutdown`]
//! waits for the last guard, bounded by a timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Sessions {
    active: AtomicUsize,
    drained: Notify,
}

/// Coordinates graceful shutdown across all sessions.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: Arc<Sessions>,
}

/// Held by a live session; releases its slot on drop.
#[derive(Debug)]
pub struct SessionGuard {
    sessions: Arc<Sessions>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.sessions.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.sessions.drained.notify_waiters();
        }
    }
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root token. Session tokens are children of it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Claim a session slot. `None` when `max` sessions are live or shutdown
    /// has begun.
    pub fn try_acquire_session(&self, max: usize) -> Option<SessionGuard> {
        if self.is_shutting_down() {
            return None;
        }
        let claimed = self
            .sessions
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1));
        if claimed.is_err() {
            return None;
        }
        Some(SessionGuard {
            sessions: self.sessions.clone(),
        })
    }

    /// Live sessions.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active.load(Ordering::Acquire)
    }

    /// Cancel the root token and wait up to `timeout` for every session to
    /// finish. Returns `true` when all sessions drained in time.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            sessions = self.active_sessions(),
            timeout_ms = timeout.as_millis(),
            "waiting for sessions to close"
        );

        let drain = async {
            loop {
                let notified = self.sessions.drained.notified();
                if self.active_sessions() == 0 {
                    return;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_ok() {
            info!("all sessions closed");
            true
        } else {
            warn!(remaining = self.active_sessions(), "shutdown timed out after {timeout:?}");
            false
        }
    }
}
