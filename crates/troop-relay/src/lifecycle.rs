//! Connect and disconnect transitions.
//!
//! Status broadcasts for a user must go out in the order its presence
//! changed, so the presence update and the matching `user_status_change`
//! fan-out happen under one gate. Lock order is gate → presence and
//! gate → router; the presence and router locks are never held together.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use troop_store::OrgStore;

use crate::auth::SessionAuthenticator;
use crate::errors::AuthenticationError;
use crate::metrics::{AUTH_FAILURES_TOTAL, PRESENCE_ONLINE_USERS};
use crate::presence::{Departure, PresenceRegistry, Transition};
use crate::protocol::{AuthClaim, OutboundEvent, SessionInfo, StatusChange};
use crate::router::TopicRouter;
use crate::websocket::connection::ClientConnection;

/// Drives a connection through `Connecting → Authenticated → Active → Closed`.
pub struct LifecycleManager {
    presence: Arc<PresenceRegistry>,
    router: Arc<TopicRouter>,
    authenticator: SessionAuthenticator,
    store: Arc<dyn OrgStore>,
    status_gate: Mutex<()>,
}

impl LifecycleManager {
    /// Manager over the shared registry and router.
    pub fn new(
        presence: Arc<PresenceRegistry>,
        router: Arc<TopicRouter>,
        store: Arc<dyn OrgStore>,
    ) -> Self {
        Self {
            presence,
            router,
            authenticator: SessionAuthenticator::new(store.clone()),
            store,
            status_gate: Mutex::new(()),
        }
    }

    /// Authenticate `connection` and make it active.
    ///
    /// On success the connection is registered as present, has been sent
    /// `authenticated` then `online_users`, and has joined its topics. On
    /// failure nothing was registered.
    pub async fn connect(
        &self,
        connection: &Arc<ClientConnection>,
        claim: &AuthClaim,
    ) -> Result<Transition, AuthenticationError> {
        let identity = match self.authenticator.authenticate(claim).await {
            Ok(identity) => identity,
            Err(err) => {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                warn!(conn_id = %connection.id, user_id = %claim.user_id, error = %err, "authentication failed");
                return Err(err);
            }
        };
        let user_id = identity.user_id.clone();
        let topics = identity.topics.clone();
        let role = identity.role;
        if !connection.authenticate(identity) {
            return Err(AuthenticationError::ConnectionClosed);
        }

        let transition = {
            let _gate = self.status_gate.lock();
            let transition = self.presence.register(&user_id, connection.clone());
            let _ = connection.activate();

            let greeting = [
                OutboundEvent::Authenticated(SessionInfo {
                    connection_id: connection.id.clone(),
                    user_id: user_id.clone(),
                    role,
                    topics: topics.clone(),
                }),
                OutboundEvent::OnlineUsers(self.presence.list_online()),
            ];
            for event in &greeting {
                if let Err(err) = connection.send_event(event) {
                    warn!(conn_id = %connection.id, kind = event.kind(), error = %err, "greeting not delivered");
                    connection.cancel();
                }
            }

            // Joined only after the greeting is queued so it is the first frame.
            for topic in &topics {
                self.router.join(topic.clone(), connection.clone());
            }

            if transition == Transition::Online {
                let _ = self.router.broadcast_all(&OutboundEvent::UserStatusChange(StatusChange {
                    user_id: user_id.clone(),
                    is_online: true,
                    last_seen: None,
                }));
            }
            transition
        };

        self.record_online_gauge();
        info!(
            conn_id = %connection.id,
            %user_id,
            %role,
            topics = topics.len(),
            came_online = transition == Transition::Online,
            "connection active"
        );
        Ok(transition)
    }

    /// Tear down `connection`. Safe to call more than once and for
    /// connections that never authenticated.
    ///
    /// Returns the presence transition, or `None` when the connection was
    /// not registered.
    pub async fn disconnect(&self, connection: &Arc<ClientConnection>) -> Option<Transition> {
        let _ = connection.close();

        let departure = {
            let _gate = self.status_gate.lock();
            let departure = self.presence.unregister(&connection.id);
            if let Some(identity) = connection.identity() {
                let _ = self.router.leave_all(&connection.id, &identity.topics);
            }
            if let Some(Departure {
                user_id,
                transition: Transition::Offline { last_seen },
                ..
            }) = &departure
            {
                let _ = self.router.broadcast_all(&OutboundEvent::UserStatusChange(StatusChange {
                    user_id: user_id.clone(),
                    is_online: false,
                    last_seen: Some(*last_seen),
                }));
            }
            departure
        };

        let departure = departure?;
        self.record_online_gauge();
        debug!(
            conn_id = %connection.id,
            user_id = %departure.user_id,
            transition = ?departure.transition,
            "connection closed"
        );

        if let Transition::Offline { last_seen } = departure.transition {
            if let Err(err) = self.store.record_last_seen(&departure.user_id, last_seen).await {
                warn!(user_id = %departure.user_id, error = %err, "failed to record last seen");
            }
        }
        Some(departure.transition)
    }

    fn record_online_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(PRESENCE_ONLINE_USERS).set(self.presence.online_count() as f64);
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingStore, org};
    use crate::websocket::connection::ConnectionState;
    use crate::websocket::connection::test_support::{connection, drain};
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;
    use troop_core::{Role, Topic, UserId};
    use troop_store::MemoryStore;

    type Rx = mpsc::Receiver<Arc<String>>;

    struct Fixture {
        memory: Arc<MemoryStore>,
        presence: Arc<PresenceRegistry>,
        router: Arc<TopicRouter>,
        lifecycle: LifecycleManager,
    }

    impl Fixture {
        fn new() -> Self {
            let memory = Arc::new(org());
            Self::with_store(memory.clone(), memory)
        }

        fn with_store(memory: Arc<MemoryStore>, store: Arc<dyn OrgStore>) -> Self {
            let presence = Arc::new(PresenceRegistry::new());
            let router = Arc::new(TopicRouter::new());
            let lifecycle = LifecycleManager::new(presence.clone(), router.clone(), store);
            Self {
                memory,
                presence,
                router,
                lifecycle,
            }
        }

        async fn connect(&self, conn_id: &str, user: &str, role: Role) -> (Arc<ClientConnection>, Rx) {
            let (conn, rx) = connection(conn_id, 32);
            let _ = self
                .lifecycle
                .connect(&conn, &claim(user, role))
                .await
                .unwrap();
            (conn, rx)
        }
    }

    fn claim(user: &str, role: Role) -> AuthClaim {
        AuthClaim {
            user_id: user.into(),
            role,
        }
    }

    fn status_changes(rx: &mut Rx) -> Vec<(String, bool)> {
        drain(rx)
            .into_iter()
            .filter(|v| v["type"] == "user_status_change")
            .map(|v| {
                (
                    v["data"]["userId"].as_str().unwrap().to_owned(),
                    v["data"]["isOnline"].as_bool().unwrap(),
                )
            })
            .collect()
    }

    // ── connect ──

    #[tokio::test]
    async fn connect_greets_then_announces() {
        let fx = Fixture::new();
        let (conn, mut rx) = connection("c1", 32);
        let transition = fx.lifecycle.connect(&conn, &claim("p1", Role::Parent)).await.unwrap();
        assert_eq!(transition, Transition::Online);
        assert_eq!(conn.state(), ConnectionState::Active);

        let frames = drain(&mut rx);
        let kinds: Vec<_> = frames.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["authenticated", "online_users", "user_status_change"]);
        assert_eq!(frames[0]["data"]["connectionId"], "c1");
        assert_eq!(
            frames[0]["data"]["topics"],
            serde_json::json!(["user:p1", "group:g1", "scout:s1", "scout:s3"])
        );
        assert_eq!(frames[1]["data"], serde_json::json!(["p1"]));

        assert!(fx.presence.is_online(&"p1".into()));
        assert!(fx.router.is_member(&Topic::Group("g1".into()), &conn.id));
    }

    #[tokio::test]
    async fn online_users_lists_everyone_already_present() {
        let fx = Fixture::new();
        let _l1 = fx.connect("l1", "l1", Role::Leader).await;
        let (_e1, mut rx) = fx.connect("e1", "e1", Role::Executive).await;
        let frames = drain(&mut rx);
        assert_eq!(frames[1]["data"], serde_json::json!(["e1", "l1"]));
    }

    #[tokio::test]
    async fn failed_authentication_registers_nothing() {
        let fx = Fixture::new();
        let (_observer, mut observer_rx) = fx.connect("obs", "e1", Role::Executive).await;
        let _ = drain(&mut observer_rx);

        let (conn, mut rx) = connection("c1", 32);
        assert_matches!(
            fx.lifecycle.connect(&conn, &claim("ghost", Role::Parent)).await,
            Err(AuthenticationError::UnknownUser(_))
        );
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(fx.presence.connection_count(), 1);
        assert_eq!(fx.router.topic_count(), 2);
        assert!(drain(&mut rx).is_empty());
        assert!(drain(&mut observer_rx).is_empty());
        assert_eq!(fx.lifecycle.disconnect(&conn).await, None);
    }

    #[tokio::test]
    async fn store_outage_during_auth_registers_nothing() {
        let memory = Arc::new(org());
        let failing = Arc::new(FailingStore::new(memory.clone()));
        failing.fail("lookup_user");
        let fx = Fixture::with_store(memory, failing);
        let (conn, _rx) = connection("c1", 32);
        assert_matches!(
            fx.lifecycle.connect(&conn, &claim("p1", Role::Parent)).await,
            Err(AuthenticationError::StoreUnavailable(_))
        );
        assert!(fx.presence.list_online().is_empty());
        assert_eq!(fx.router.topic_count(), 0);
    }

    // ── disconnect ──

    #[tokio::test]
    async fn two_tabs_one_offline_event() {
        let fx = Fixture::new();
        let (_watcher, mut watch_rx) = fx.connect("watch", "e1", Role::Executive).await;
        let (tab_a, _rx_a) = fx.connect("tab-a", "p1", Role::Parent).await;
        let (tab_b, _rx_b) = fx.connect("tab-b", "p1", Role::Parent).await;
        assert_eq!(
            status_changes(&mut watch_rx),
            [("e1".to_owned(), true), ("p1".to_owned(), true)]
        );

        assert_eq!(fx.lifecycle.disconnect(&tab_a).await, Some(Transition::Unchanged));
        assert!(fx.presence.is_online(&"p1".into()));
        assert!(status_changes(&mut watch_rx).is_empty());

        assert_matches!(fx.lifecycle.disconnect(&tab_b).await, Some(Transition::Offline { .. }));
        assert_eq!(status_changes(&mut watch_rx), [("p1".to_owned(), false)]);
        assert!(!fx.presence.is_online(&"p1".into()));
        assert!(fx.memory.last_seen(&UserId::from("p1")).is_some());
    }

    #[tokio::test]
    async fn disconnect_leaves_topics_and_is_idempotent() {
        let fx = Fixture::new();
        let (conn, _rx) = fx.connect("c1", "l1", Role::Leader).await;
        assert_eq!(fx.router.topic_count(), 2);

        assert_matches!(fx.lifecycle.disconnect(&conn).await, Some(Transition::Offline { .. }));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.cancel_token().is_cancelled());
        assert_eq!(fx.router.topic_count(), 0);
        assert_eq!(fx.lifecycle.disconnect(&conn).await, None);
    }

    #[tokio::test]
    async fn offline_event_carries_last_seen() {
        let fx = Fixture::new();
        let (_watcher, mut watch_rx) = fx.connect("watch", "e1", Role::Executive).await;
        let (conn, _rx) = fx.connect("c1", "p2", Role::Parent).await;
        let _ = drain(&mut watch_rx);

        let _ = fx.lifecycle.disconnect(&conn).await;
        let frames = drain(&mut watch_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"]["isOnline"], false);
        assert!(frames[0]["data"]["lastSeen"].is_string());
    }

    #[tokio::test]
    async fn last_seen_failure_does_not_block_cleanup() {
        let memory = Arc::new(org());
        let failing = Arc::new(FailingStore::new(memory.clone()));
        failing.fail("record_last_seen");
        let fx = Fixture::with_store(memory, failing);
        let (conn, _rx) = fx.connect("c1", "p1", Role::Parent).await;

        assert_matches!(fx.lifecycle.disconnect(&conn).await, Some(Transition::Offline { .. }));
        assert!(fx.presence.list_online().is_empty());
        assert_eq!(fx.router.topic_count(), 0);
    }
}
