//! Presence registry: who is online, through which connections.
//!
//! A user is online exactly while at least one of its connections is
//! registered. The online flag is derived from the connection set under one
//! lock, so a user with two tabs that closes one stays online, and closing
//! the last tab yields exactly one offline transition.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use troop_core::{ConnectionId, UserId};

use crate::websocket::connection::ClientConnection;

/// Presence change caused by one register or unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The user's online state did not change.
    Unchanged,
    /// First connection of an offline user.
    Online,
    /// Last connection of an online user went away.
    Offline {
        /// When the user went offline.
        last_seen: DateTime<Utc>,
    },
}

/// Result of removing a connection.
#[derive(Debug, Clone)]
pub struct Departure {
    /// The removed connection.
    pub connection: Arc<ClientConnection>,
    /// Its user.
    pub user_id: UserId,
    /// Resulting presence change.
    pub transition: Transition,
}

#[derive(Debug, Default)]
struct UserPresence {
    connections: HashSet<ConnectionId>,
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, UserPresence>,
    connections: HashMap<ConnectionId, (UserId, Arc<ClientConnection>)>,
}

/// Registry of live connections per user.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<Inner>,
}

impl PresenceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `connection` as a live connection of `user_id`.
    ///
    /// Registering the same connection twice is a no-op.
    pub fn register(&self, user_id: &UserId, connection: Arc<ClientConnection>) -> Transition {
        let mut inner = self.inner.lock();
        if inner.connections.contains_key(&connection.id) {
            return Transition::Unchanged;
        }
        let conn_id = connection.id.clone();
        let _ = inner
            .connections
            .insert(conn_id.clone(), (user_id.clone(), connection));
        let entry = inner.users.entry(user_id.clone()).or_default();
        let came_online = entry.connections.is_empty();
        let _ = entry.connections.insert(conn_id.clone());
        debug!(%user_id, %conn_id, live = entry.connections.len(), "connection registered");
        if came_online {
            Transition::Online
        } else {
            Transition::Unchanged
        }
    }

    /// Remove a connection. Unknown ids return `None`.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.lock();
        let (user_id, connection) = inner.connections.remove(connection_id)?;
        let entry = inner.users.entry(user_id.clone()).or_default();
        let _ = entry.connections.remove(connection_id);
        let transition = if entry.connections.is_empty() {
            let now = Utc::now();
            entry.last_seen = Some(now);
            Transition::Offline { last_seen: now }
        } else {
            Transition::Unchanged
        };
        debug!(%user_id, conn_id = %connection_id, live = entry.connections.len(), "connection unregistered");
        Some(Departure {
            connection,
            user_id,
            transition,
        })
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.inner
            .lock()
            .users
            .get(user_id)
            .is_some_and(|p| !p.connections.is_empty())
    }

    /// Online users, sorted.
    pub fn list_online(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .inner
            .lock()
            .users
            .iter()
            .filter(|(_, p)| !p.connections.is_empty())
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// When the user last went offline. `None` if never seen offline.
    pub fn last_seen(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.inner.lock().users.get(user_id).and_then(|p| p.last_seen)
    }

    /// Live connections of one user.
    pub fn connections_for(&self, user_id: &UserId) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.lock();
        inner
            .users
            .get(user_id)
            .map(|p| {
                p.connections
                    .iter()
                    .filter_map(|id| inner.connections.get(id).map(|(_, c)| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every live connection.
    pub fn all_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.inner
            .lock()
            .connections
            .values()
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Number of online users.
    pub fn online_count(&self) -> usize {
        self.inner
            .lock()
            .users
            .values()
            .filter(|p| !p.connections.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::test_support::connection;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn conn(id: &str) -> Arc<ClientConnection> {
        connection(id, 4).0
    }

    #[test]
    fn first_connection_brings_user_online() {
        let presence = PresenceRegistry::new();
        let user = UserId::from("p1");
        assert_eq!(presence.register(&user, conn("c1")), Transition::Online);
        assert!(presence.is_online(&user));
        assert_eq!(presence.list_online(), vec![user]);
    }

    #[test]
    fn second_tab_is_unchanged_and_closing_one_keeps_online() {
        let presence = PresenceRegistry::new();
        let user = UserId::from("p1");
        assert_eq!(presence.register(&user, conn("c1")), Transition::Online);
        assert_eq!(presence.register(&user, conn("c2")), Transition::Unchanged);
        assert_eq!(presence.connections_for(&user).len(), 2);

        let first = presence.unregister(&"c1".into()).unwrap();
        assert_eq!(first.transition, Transition::Unchanged);
        assert!(presence.is_online(&user));

        let last = presence.unregister(&"c2".into()).unwrap();
        assert_matches!(last.transition, Transition::Offline { .. });
        assert_eq!(last.user_id, user);
        assert!(!presence.is_online(&user));
        assert!(presence.last_seen(&user).is_some());
    }

    #[test]
    fn unknown_and_double_unregister_are_noops() {
        let presence = PresenceRegistry::new();
        assert!(presence.unregister(&"ghost".into()).is_none());
        let _ = presence.register(&"p1".into(), conn("c1"));
        assert!(presence.unregister(&"c1".into()).is_some());
        assert!(presence.unregister(&"c1".into()).is_none());
        assert_eq!(presence.connection_count(), 0);
    }

    #[test]
    fn duplicate_register_is_ignored() {
        let presence = PresenceRegistry::new();
        let c1 = conn("c1");
        assert_eq!(presence.register(&"p1".into(), c1.clone()), Transition::Online);
        assert_eq!(presence.register(&"p1".into(), c1), Transition::Unchanged);
        assert_eq!(presence.connection_count(), 1);
        assert_matches!(
            presence.unregister(&"c1".into()).map(|d| d.transition),
            Some(Transition::Offline { .. })
        );
    }

    #[test]
    fn last_seen_survives_reconnect() {
        let presence = PresenceRegistry::new();
        let user = UserId::from("p1");
        let _ = presence.register(&user, conn("c1"));
        let _ = presence.unregister(&"c1".into());
        let seen = presence.last_seen(&user);
        assert_eq!(presence.register(&user, conn("c2")), Transition::Online);
        assert_eq!(presence.last_seen(&user), seen);
    }

    #[test]
    fn counts() {
        let presence = PresenceRegistry::new();
        let _ = presence.register(&"a".into(), conn("c1"));
        let _ = presence.register(&"a".into(), conn("c2"));
        let _ = presence.register(&"b".into(), conn("c3"));
        assert_eq!(presence.connection_count(), 3);
        assert_eq!(presence.online_count(), 2);
        assert_eq!(presence.all_connections().len(), 3);
        assert_eq!(presence.list_online(), vec![UserId::from("a"), UserId::from("b")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_keeps_invariant() {
        let presence = Arc::new(PresenceRegistry::new());
        let mut handles = Vec::new();
        for task in 0..16 {
            let presence = presence.clone();
            handles.push(tokio::spawn(async move {
                let mut transitions: i64 = 0;
                for round in 0..50 {
                    let user = UserId::from(format!("u{}", (task + round) % 3));
                    let id = format!("t{task}-r{round}");
                    if presence.register(&user, conn(&id)) == Transition::Online {
                        transitions += 1;
                    }
                    tokio::task::yield_now().await;
                    if let Some(d) = presence.unregister(&id.as_str().into()) {
                        if matches!(d.transition, Transition::Offline { .. }) {
                            transitions -= 1;
                        }
                    }
                }
                transitions
            }));
        }
        let mut net = 0;
        for handle in handles {
            net += handle.await.unwrap();
        }
        assert_eq!(net, 0);
        assert_eq!(presence.connection_count(), 0);
        assert!(presence.list_online().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(u8, u8),
        Unregister(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..3, 0u8..8).prop_map(|(u, c)| Op::Register(u, c)),
            (0u8..8).prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn online_iff_at_least_one_connection(ops in proptest::collection::vec(op_strategy(), 0..60)) {
            let presence = PresenceRegistry::new();
            let mut model: HashMap<u8, u8> = HashMap::new();

            for op in ops {
                match op {
                    Op::Register(u, c) => {
                        if model.contains_key(&c) {
                            continue;
                        }
                        let user = UserId::from(format!("u{u}"));
                        let was_online = model.values().any(|owner| *owner == u);
                        let transition = presence.register(&user, conn(&format!("c{c}")));
                        prop_assert_eq!(transition == Transition::Online, !was_online);
                        let _ = model.insert(c, u);
                    }
                    Op::Unregister(c) => {
                        let departure = presence.unregister(&format!("c{c}").as_str().into());
                        match model.remove(&c) {
                            None => prop_assert!(departure.is_none()),
                            Some(u) => {
                                let still_online = model.values().any(|owner| *owner == u);
                                let went_offline = matches!(
                                    departure.map(|d| d.transition),
                                    Some(Transition::Offline { .. })
                                );
                                prop_assert_eq!(went_offline, !still_online);
                            }
                        }
                    }
                }

                for u in 0u8..3 {
                    let expected = model.values().any(|owner| *owner == u);
                    prop_assert_eq!(presence.is_online(&UserId::from(format!("u{u}"))), expected);
                }
            }
        }
    }
}
