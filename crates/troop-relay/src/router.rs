//! Topic subscriptions and event fan-out.
//!
//! Publishing never awaits: each recipient gets a non-blocking enqueue into
//! its bounded outbound queue. A recipient whose queue is full or closed is
//! evicted from every topic and cancelled, and delivery carries on with the
//! rest.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use troop_core::{ConnectionId, Topic};

use crate::metrics::{FRAMES_DELIVERED_TOTAL, FRAMES_DROPPED_TOTAL};
use crate::protocol::OutboundEvent;
use crate::websocket::connection::ClientConnection;

type Members = HashMap<ConnectionId, Arc<ClientConnection>>;

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections whose queue accepted the frame.
    pub delivered: usize,
    /// Connections that failed and were evicted.
    pub dropped: Vec<ConnectionId>,
}

impl DeliveryReport {
    /// Every connection the frame was offered to.
    pub fn recipients(&self) -> usize {
        self.delivered + self.dropped.len()
    }
}

/// Topic → member connections.
#[derive(Debug, Default)]
pub struct TopicRouter {
    topics: RwLock<HashMap<Topic, Members>>,
}

impl TopicRouter {
    /// Empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `connection` to `topic`. Joining twice is a no-op.
    pub fn join(&self, topic: Topic, connection: Arc<ClientConnection>) {
        let mut topics = self.topics.write();
        let members = topics.entry(topic).or_default();
        let _ = members.entry(connection.id.clone()).or_insert(connection);
    }

    /// Unsubscribe one connection from one topic, dropping the topic when it
    /// empties. Returns whether the connection was a member.
    pub fn leave(&self, topic: &Topic, connection_id: &ConnectionId) -> bool {
        let mut topics = self.topics.write();
        remove_member(&mut topics, topic, connection_id)
    }

    /// Unsubscribe one connection from each of `topics` under one lock.
    pub fn leave_all<'a>(
        &self,
        connection_id: &ConnectionId,
        topics: impl IntoIterator<Item = &'a Topic>,
    ) -> usize {
        let mut map = self.topics.write();
        topics
            .into_iter()
            .filter(|topic| remove_member(&mut map, topic, connection_id))
            .count()
    }

    /// Deliver `event` to every member of `topic`.
    pub fn publish(&self, topic: &Topic, event: &OutboundEvent) -> DeliveryReport {
        let recipients: Vec<_> = {
            let topics = self.topics.read();
            topics
                .get(topic)
                .map(|members| members.values().cloned().collect())
                .unwrap_or_default()
        };
        debug!(%topic, kind = event.kind(), recipients = recipients.len(), "publish");
        self.deliver(recipients, event)
    }

    /// Deliver `event` once to every connection in any of `topics`.
    pub fn publish_many<'a>(
        &self,
        topics: impl IntoIterator<Item = &'a Topic>,
        event: &OutboundEvent,
    ) -> DeliveryReport {
        let recipients = {
            let map = self.topics.read();
            let mut seen = HashSet::new();
            let mut recipients = Vec::new();
            for topic in topics {
                let Some(members) = map.get(topic) else {
                    continue;
                };
                for (id, connection) in members {
                    if seen.insert(id.clone()) {
                        recipients.push(connection.clone());
                    }
                }
            }
            recipients
        };
        debug!(kind = event.kind(), recipients = recipients.len(), "publish to topics");
        self.deliver(recipients, event)
    }

    /// Deliver `event` once to every subscribed connection.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> DeliveryReport {
        let recipients = {
            let map = self.topics.read();
            let mut seen = HashSet::new();
            map.values()
                .flat_map(HashMap::iter)
                .filter(|(id, _)| seen.insert((*id).clone()))
                .map(|(_, connection)| connection.clone())
                .collect::<Vec<_>>()
        };
        debug!(kind = event.kind(), recipients = recipients.len(), "broadcast to all");
        self.deliver(recipients, event)
    }

    fn deliver(&self, recipients: Vec<Arc<ClientConnection>>, event: &OutboundEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if recipients.is_empty() {
            return report;
        }
        let kind = event.kind();
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(kind, error = %err, "failed to serialize event");
                return report;
            }
        };

        let mut failed = Vec::new();
        for connection in recipients {
            match connection.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(conn_id = %connection.id, kind, error = %err, "dropping subscriber");
                    failed.push(connection);
                }
            }
        }

        metrics::counter!(FRAMES_DELIVERED_TOTAL, "kind" => kind).increment(report.delivered as u64);
        if !failed.is_empty() {
            metrics::counter!(FRAMES_DROPPED_TOTAL, "kind" => kind).increment(failed.len() as u64);
            self.evict(&failed);
            for connection in failed {
                connection.cancel();
                report.dropped.push(connection.id.clone());
            }
        }
        report
    }

    /// Remove connections from every topic.
    fn evict(&self, connections: &[Arc<ClientConnection>]) {
        let mut topics = self.topics.write();
        for connection in connections {
            topics.retain(|_, members| {
                let _ = members.remove(&connection.id);
                !members.is_empty()
            });
        }
    }

    /// Members of one topic.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.read().get(topic).map_or(0, HashMap::len)
    }

    /// Topics with at least one member.
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Live topics, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.topics.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Whether `connection_id` is subscribed to `topic`.
    pub fn is_member(&self, topic: &Topic, connection_id: &ConnectionId) -> bool {
        self.topics
            .read()
            .get(topic)
            .is_some_and(|members| members.contains_key(connection_id))
    }
}

fn remove_member(
    topics: &mut HashMap<Topic, Members>,
    topic: &Topic,
    connection_id: &ConnectionId,
) -> bool {
    let Entry::Occupied(mut entry) = topics.entry(topic.clone()) else {
        return false;
    };
    let removed = entry.get_mut().remove(connection_id).is_some();
    if entry.get().is_empty() {
        let _ = entry.remove();
    }
    removed
}
