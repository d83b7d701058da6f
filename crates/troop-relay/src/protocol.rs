//! Wire protocol.
//!
//! Every frame is a JSON text frame of the form
//! `{"type": "<kind>", "data": {...}}` with camelCase fields.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use troop_core::{
    Achievement, Attendance, AttendanceStatus, ChatMessage, ConnectionId, Document, EventId,
    GroupId, Role, ScoutId, Topic, UserId,
};

use crate::errors::{RelayError, ValidationError};

/// Identity claimed by a connecting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthClaim {
    /// Claimed user.
    pub user_id: UserId,
    /// Claimed role.
    pub role: Role,
}

/// `send_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Author; must be the socket's user.
    pub sender_id: UserId,
    /// Recipient.
    pub receiver_id: UserId,
    /// Body.
    pub content: String,
}

/// `update_event_rsvp` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRsvp {
    /// Calendar event.
    pub event_id: EventId,
    /// Scout the RSVP is for.
    pub scout_id: ScoutId,
    /// Group to notify.
    pub group_id: GroupId,
    /// Acting user; must be the socket's user.
    pub user_id: UserId,
    /// New status.
    pub status: AttendanceStatus,
}

/// `update_scout_progress` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScoutProgress {
    /// Recipient scout.
    pub scout_id: ScoutId,
    /// Scout's group.
    pub group_id: GroupId,
    /// Achievement name.
    pub name: String,
    /// Achievement description.
    #[serde(default)]
    pub description: String,
}

/// `document_uploaded` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploaded {
    /// Display title.
    pub title: String,
    /// Original file name.
    pub file_name: String,
    /// Storage URL.
    pub file_url: String,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Owning group; absent for organization-wide documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// First frame of every session.
    Authenticate(AuthClaim),
    /// Direct message.
    SendMessage(SendMessage),
    /// RSVP change.
    UpdateEventRsvp(UpdateEventRsvp),
    /// Achievement award.
    UpdateScoutProgress(UpdateScoutProgress),
    /// Document upload notice.
    DocumentUploaded(DocumentUploaded),
}

impl InboundEvent {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::SendMessage(_) => "send_message",
            Self::UpdateEventRsvp(_) => "update_event_rsvp",
            Self::UpdateScoutProgress(_) => "update_scout_progress",
            Self::DocumentUploaded(_) => "document_uploaded",
        }
    }
}

/// Sent to a socket once it is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// This socket.
    pub connection_id: ConnectionId,
    /// Authenticated user.
    pub user_id: UserId,
    /// Stored role.
    pub role: Role,
    /// Joined topics.
    pub topics: BTreeSet<Topic>,
}

/// A user came online or went offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// The user.
    pub user_id: UserId,
    /// New state.
    pub is_online: bool,
    /// Set when going offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Body of the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Authentication succeeded.
    Authenticated(SessionInfo),
    /// Users online at the moment this socket activated.
    OnlineUsers(Vec<UserId>),
    /// Presence change of one user.
    UserStatusChange(StatusChange),
    /// A new direct message.
    ReceiveMessage(ChatMessage),
    /// An attendance row changed.
    EventRsvpUpdated(Attendance),
    /// A scout earned an achievement.
    ScoutProgressUpdated(Achievement),
    /// A document was uploaded.
    NewDocument(Document),
    /// The last inbound event from this socket failed.
    Error(ErrorPayload),
}

impl OutboundEvent {
    /// Wrap a relay error for the originating socket.
    pub fn error(err: &RelayError) -> Self {
        Self::Error(ErrorPayload {
            code: err.code().to_owned(),
            message: err.to_string(),
        })
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::OnlineUsers(_) => "online_users",
            Self::UserStatusChange(_) => "user_status_change",
            Self::ReceiveMessage(_) => "receive_message",
            Self::EventRsvpUpdated(_) => "event_rsvp_updated",
            Self::ScoutProgressUpdated(_) => "scout_progress_updated",
            Self::NewDocument(_) => "new_document",
            Self::Error(_) => "error",
        }
    }

    /// Serialize once into a frame shared by every recipient.
    pub fn encode(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}
