//! # troop-store
//!
//! The data-access interface the relay consumes. Users, groups, scouts and
//! calendar events live in an external relational store; the relay only
//! reads relationships and writes the records it relays.
//!
//! [`MemoryStore`] is an in-process implementation for tests and local runs.
//! It can be seeded from a JSON file (see [`Seed`]).

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod seed;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use seed::Seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use troop_core::{
    Achievement, Attendance, AttendanceStatus, ChatMessage, Document, DocumentMeta, EventId,
    GroupId, Role, ScoutId, ScoutLink, UserId,
};

/// A user row as the relay needs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// User id.
    pub id: UserId,
    /// Stored role.
    pub role: Role,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
}

/// Organization store.
///
/// `NotFound` must be returned for unknown referenced entities so callers can
/// tell a bad request apart from an unavailable store.
#[async_trait]
pub trait OrgStore: Send + Sync {
    /// Fetch a user.
    async fn lookup_user(&self, user_id: &UserId) -> Result<UserRecord>;

    /// Groups the user leads.
    async fn groups_led_by(&self, user_id: &UserId) -> Result<Vec<GroupId>>;

    /// Scouts the user parents, each with its group when assigned.
    async fn scouts_parented_by(&self, user_id: &UserId) -> Result<Vec<ScoutLink>>;

    /// A scout with the group it is placed in.
    async fn lookup_scout(&self, scout: &ScoutId) -> Result<ScoutLink>;

    /// Fail with `NotFound` unless the group exists.
    async fn require_group(&self, group: &GroupId) -> Result<()>;

    /// Persist a direct message.
    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<ChatMessage>;

    /// Insert or update the attendance row for `(event, scout)`.
    async fn upsert_attendance(
        &self,
        event: &EventId,
        scout: &ScoutId,
        acting_user: &UserId,
        status: AttendanceStatus,
    ) -> Result<Attendance>;

    /// Persist an achievement award.
    async fn create_achievement(
        &self,
        scout: &ScoutId,
        name: &str,
        description: &str,
    ) -> Result<Achievement>;

    /// Persist a document reference.
    async fn create_document(&self, meta: DocumentMeta) -> Result<Document>;

    /// Record when a user was last seen online.
    async fn record_last_seen(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<()>;
}
