//! Inbound domain events.
//!
//! Every handler runs validate → persist → fan out. Nothing reaches the
//! router until the store has accepted the write, and the topics are taken
//! from the written record's keys. A `groupId` sent with an RSVP or a
//! progress update must be the scout's own group.
//!
//! | Event | Store call | Topics |
//! |---|---|---|
//! | `send_message` | `create_message` | `user:<sender>`, `user:<receiver>` |
//! | `update_event_rsvp` | `upsert_attendance` | `group:<group>`, `user:<acting user>` |
//! | `update_scout_progress` | `create_achievement` | `scout:<scout>`, `group:<group>`, `executives` |
//! | `document_uploaded` | `create_document` | `group:<group>`, or everyone |

use std::sync::Arc;

use tracing::{debug, instrument};
use troop_core::{DocumentMeta, GroupId, ScoutId, Topic, UserId, UserIdentity};
use troop_store::OrgStore;

use crate::errors::{AuthenticationError, RelayError, ValidationError};
use crate::metrics::{EVENTS_FAILED_TOTAL, EVENTS_INBOUND_TOTAL};
use crate::protocol::{
    DocumentUploaded, InboundEvent, OutboundEvent, SendMessage, UpdateEventRsvp,
    UpdateScoutProgress,
};
use crate::router::{DeliveryReport, TopicRouter};
use crate::websocket::connection::ClientConnection;

/// Dispatches inbound events from authenticated connections.
#[derive(Clone)]
pub struct EventHandlers {
    store: Arc<dyn OrgStore>,
    router: Arc<TopicRouter>,
    max_message_chars: usize,
}

impl EventHandlers {
    /// Handlers writing to `store` and publishing through `router`.
    pub fn new(store: Arc<dyn OrgStore>, router: Arc<TopicRouter>, max_message_chars: usize) -> Self {
        Self {
            store,
            router,
            max_message_chars,
        }
    }

    /// Handle one event from `connection`.
    ///
    /// Errors are for the sender only; the caller reports them on the same
    /// socket.
    #[instrument(skip_all, fields(conn_id = %connection.id, kind = event.kind()))]
    pub async fn handle(
        &self,
        connection: &ClientConnection,
        event: InboundEvent,
    ) -> Result<DeliveryReport, RelayError> {
        let kind = event.kind();
        metrics::counter!(EVENTS_INBOUND_TOTAL, "kind" => kind).increment(1);

        let result = match connection.identity() {
            None => Err(AuthenticationError::NotAuthenticated.into()),
            Some(identity) => self.dispatch(identity, event).await,
        };

        match &result {
            Ok(report) => debug!(delivered = report.delivered, dropped = report.dropped.len(), "event relayed"),
            Err(err) => {
                metrics::counter!(EVENTS_FAILED_TOTAL, "kind" => kind, "code" => err.code()).increment(1);
                debug!(error = %err, "event rejected");
            }
        }
        result
    }

    async fn dispatch(
        &self,
        identity: &UserIdentity,
        event: InboundEvent,
    ) -> Result<DeliveryReport, RelayError> {
        match event {
            InboundEvent::Authenticate(_) => Err(ValidationError::AlreadyAuthenticated.into()),
            InboundEvent::SendMessage(msg) => self.send_message(identity, msg).await,
            InboundEvent::UpdateEventRsvp(rsvp) => self.update_event_rsvp(identity, rsvp).await,
            InboundEvent::UpdateScoutProgress(progress) => self.update_scout_progress(progress).await,
            InboundEvent::DocumentUploaded(doc) => self.document_uploaded(identity, doc).await,
        }
    }

    async fn send_message(
        &self,
        identity: &UserIdentity,
        msg: SendMessage,
    ) -> Result<DeliveryReport, RelayError> {
        require("senderId", msg.sender_id.as_str())?;
        require("receiverId", msg.receiver_id.as_str())?;
        require("content", &msg.content)?;
        if msg.content.chars().count() > self.max_message_chars {
            return Err(ValidationError::TooLong {
                max: self.max_message_chars,
            }
            .into());
        }
        acting_as(identity, &msg.sender_id, "senderId")?;

        let message = self
            .store
            .create_message(&msg.sender_id, &msg.receiver_id, &msg.content)
            .await
            .map_err(|e| RelayError::from_store("create_message", e))?;

        let topics = [
            Topic::User(message.sender_id.clone()),
            Topic::User(message.receiver_id.clone()),
        ];
        Ok(self
            .router
            .publish_many(&topics, &OutboundEvent::ReceiveMessage(message)))
    }

    async fn update_event_rsvp(
        &self,
        identity: &UserIdentity,
        rsvp: UpdateEventRsvp,
    ) -> Result<DeliveryReport, RelayError> {
        require("eventId", rsvp.event_id.as_str())?;
        require("scoutId", rsvp.scout_id.as_str())?;
        require("groupId", rsvp.group_id.as_str())?;
        require("userId", rsvp.user_id.as_str())?;
        acting_as(identity, &rsvp.user_id, "userId")?;
        self.scout_in_group(&rsvp.scout_id, &rsvp.group_id).await?;

        let attendance = self
            .store
            .upsert_attendance(&rsvp.event_id, &rsvp.scout_id, &rsvp.user_id, rsvp.status)
            .await
            .map_err(|e| RelayError::from_store("upsert_attendance", e))?;

        let topics = [
            Topic::Group(rsvp.group_id),
            Topic::User(attendance.user_id.clone()),
        ];
        Ok(self
            .router
            .publish_many(&topics, &OutboundEvent::EventRsvpUpdated(attendance)))
    }

    async fn update_scout_progress(
        &self,
        progress: UpdateScoutProgress,
    ) -> Result<DeliveryReport, RelayError> {
        require("scoutId", progress.scout_id.as_str())?;
        require("groupId", progress.group_id.as_str())?;
        require("name", &progress.name)?;
        self.scout_in_group(&progress.scout_id, &progress.group_id).await?;

        let achievement = self
            .store
            .create_achievement(&progress.scout_id, &progress.name, &progress.description)
            .await
            .map_err(|e| RelayError::from_store("create_achievement", e))?;

        let topics = [
            Topic::Scout(achievement.scout_id.clone()),
            Topic::Group(progress.group_id),
            Topic::Executives,
        ];
        Ok(self
            .router
            .publish_many(&topics, &OutboundEvent::ScoutProgressUpdated(achievement)))
    }

    /// The group must exist and be the one the scout is placed in.
    async fn scout_in_group(&self, scout: &ScoutId, group: &GroupId) -> Result<(), RelayError> {
        self.store
            .require_group(group)
            .await
            .map_err(|e| RelayError::from_store("require_group", e))?;
        let link = self
            .store
            .lookup_scout(scout)
            .await
            .map_err(|e| RelayError::from_store("lookup_scout", e))?;
        if link.group_id.as_ref() == Some(group) {
            Ok(())
        } else {
            Err(ValidationError::GroupMismatch {
                scout: link.scout_id,
                group: group.clone(),
            }
            .into())
        }
    }

    async fn document_uploaded(
        &self,
        identity: &UserIdentity,
        doc: DocumentUploaded,
    ) -> Result<DeliveryReport, RelayError> {
        require("title", &doc.title)?;
        require("fileName", &doc.file_name)?;
        require("fileUrl", &doc.file_url)?;
        if let Some(group) = &doc.group_id {
            require("groupId", group.as_str())?;
        }

        let meta = DocumentMeta {
            title: doc.title,
            file_name: doc.file_name,
            file_url: doc.file_url,
            mime_type: doc.mime_type,
            uploaded_by: identity.user_id.clone(),
            group_id: doc.group_id,
        };
        let document = self
            .store
            .create_document(meta)
            .await
            .map_err(|e| RelayError::from_store("create_document", e))?;

        let topic = document.meta.group_id.clone().map(Topic::Group);
        let event = OutboundEvent::NewDocument(document);
        Ok(match topic {
            Some(topic) => self.router.publish(&topic, &event),
            None => self.router.broadcast_all(&event),
        })
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("max_message_chars", &self.max_message_chars)
            .finish_non_exhaustive()
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankField(field))
    } else {
        Ok(())
    }
}

fn acting_as(identity: &UserIdentity, claimed: &UserId, field: &'static str) -> Result<(), ValidationError> {
    if &identity.user_id == claimed {
        Ok(())
    } else {
        Err(ValidationError::IdentityMismatch { field })
    }
}
