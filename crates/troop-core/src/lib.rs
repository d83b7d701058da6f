//! # troop-core
//!
//! Shared vocabulary for the troop presence and event relay.
//!
//! - **Branded IDs**: `UserId`, `GroupId`, `ScoutId`, `EventId` and friends as
//!   newtypes so a scout id can never be passed where a group id is expected
//! - **Identity**: `Role`, `UserIdentity` and the pure [`derive_topics`]
//!   function that maps organizational relationships to topic memberships
//! - **Topics**: the `Topic` addressing scheme (`user:`, `group:`, `scout:`,
//!   `executives`)
//! - **Records**: chat messages, attendance rows, achievements and documents
//!   as returned by the organization store

#![deny(unsafe_code)]

pub mod identity;
pub mod ids;
pub mod records;
pub mod topic;

pub use identity::{Relationships, Role, ScoutLink, UserIdentity, derive_topics};
pub use ids::{
    AchievementId, AttendanceId, ConnectionId, DocumentId, EventId, GroupId, MessageId, ScoutId,
    UserId,
};
pub use records::{Achievement, Attendance, AttendanceStatus, ChatMessage, Document, DocumentMeta};
pub use topic::{Topic, TopicParseError};
