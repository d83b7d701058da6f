//! Records returned by the organization store after a write.
//!
//! These are relayed to subscribers verbatim, so their serde shape is part
//! of the wire protocol (camelCase, RFC 3339 timestamps).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AchievementId, AttendanceId, DocumentId, EventId, GroupId, MessageId, ScoutId, UserId,
};

/// A direct message between two users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Recipient.
    pub receiver_id: UserId,
    /// Message body.
    pub content: String,
    /// When the store accepted the message.
    pub created_at: DateTime<Utc>,
}

/// RSVP state of a scout for a calendar event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    /// Will attend, or attended.
    Present,
    /// Will not attend.
    Absent,
    /// Absent with a reason.
    Excused,
    /// Arriving late.
    Late,
}

impl AttendanceStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Excused => "excused",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "excused" => Ok(Self::Excused),
            "late" => Ok(Self::Late),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One attendance row. There is at most one per (event, scout) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    /// Row id, stable across updates of the same (event, scout) pair.
    pub id: AttendanceId,
    /// Calendar event.
    pub event_id: EventId,
    /// Scout the RSVP is for.
    pub scout_id: ScoutId,
    /// User who last set the status.
    pub user_id: UserId,
    /// Current status.
    pub status: AttendanceStatus,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

/// An achievement awarded to a scout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    /// Achievement id.
    pub id: AchievementId,
    /// Recipient.
    pub scout_id: ScoutId,
    /// Badge or milestone name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Award time.
    pub awarded_at: DateTime<Utc>,
}

/// Metadata describing an uploaded document. The file itself lives in
/// external storage; only the reference is relayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    /// Display title.
    pub title: String,
    /// Original file name.
    pub file_name: String,
    /// Where the file can be fetched.
    pub file_url: String,
    /// MIME type, when the uploader supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Uploader.
    pub uploaded_by: UserId,
    /// Owning group. `None` means organization-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// A persisted document record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Document id.
    pub id: DocumentId,
    /// Upload metadata.
    #[serde(flatten)]
    pub meta: DocumentMeta,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}
