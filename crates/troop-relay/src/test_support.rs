//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use troop_core::{
    Achievement, Attendance, AttendanceStatus, ChatMessage, Document, DocumentMeta, EventId,
    GroupId, Role, ScoutId, ScoutLink, UserId,
};
use troop_store::{MemoryStore, OrgStore, Result, StoreError, UserRecord};

/// A small organization:
///
/// - `l1` leads `g1`, `l2` leads `g2`
/// - `p1` parents `s1` (in `g1`) and `s3` (unplaced); `p2` parents `s2` (in `g2`)
/// - `e1` is an executive
/// - events `ev1`, `ev2`
pub(crate) fn org() -> MemoryStore {
    MemoryStore::new()
        .with_user("l1", Role::Leader, "Lee")
        .with_user("l2", Role::Leader, "Lou")
        .with_user("p1", Role::Parent, "Pat")
        .with_user("p2", Role::Parent, "Pam")
        .with_user("e1", Role::Executive, "Eve")
        .with_group("g1", Some("l1"))
        .with_group("g2", Some("l2"))
        .with_scout("s1", Some("g1"), &["p1"])
        .with_scout("s2", Some("g2"), &["p2"])
        .with_scout("s3", None, &["p1"])
        .with_event("ev1")
        .with_event("ev2")
}

/// [`MemoryStore`] whose named operations fail with `Unavailable`.
pub(crate) struct FailingStore {
    pub(crate) inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FailingStore {
    pub(crate) fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn fail(&self, operation: &'static str) {
        let _ = self.failing.lock().insert(operation);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().contains(operation) {
            Err(StoreError::Unavailable(format!("{operation} is down")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrgStore for FailingStore {
    async fn lookup_user(&self, user_id: &UserId) -> Result<UserRecord> {
        self.check("lookup_user")?;
        self.inner.lookup_user(user_id).await
    }

    async fn groups_led_by(&self, user_id: &UserId) -> Result<Vec<GroupId>> {
        self.check("groups_led_by")?;
        self.inner.groups_led_by(user_id).await
    }

    async fn scouts_parented_by(&self, user_id: &UserId) -> Result<Vec<ScoutLink>> {
        self.check("scouts_parented_by")?;
        self.inner.scouts_parented_by(user_id).await
    }

    async fn lookup_scout(&self, scout: &ScoutId) -> Result<ScoutLink> {
        self.check("lookup_scout")?;
        self.inner.lookup_scout(scout).await
    }

    async fn require_group(&self, group: &GroupId) -> Result<()> {
        self.check("require_group")?;
        self.inner.require_group(group).await
    }

    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<ChatMessage> {
        self.check("create_message")?;
        self.inner.create_message(sender, receiver, content).await
    }

    async fn upsert_attendance(
        &self,
        event: &EventId,
        scout: &ScoutId,
        acting_user: &UserId,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        self.check("upsert_attendance")?;
        self.inner
            .upsert_attendance(event, scout, acting_user, status)
            .await
    }

    async fn create_achievement(
        &self,
        scout: &ScoutId,
        name: &str,
        description: &str,
    ) -> Result<Achievement> {
        self.check("create_achievement")?;
        self.inner.create_achievement(scout, name, description).await
    }

    async fn create_document(&self, meta: DocumentMeta) -> Result<Document> {
        self.check("create_document")?;
        self.inner.create_document(meta).await
    }

    async fn record_last_seen(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<()> {
        self.check("record_last_seen")?;
        self.inner.record_last_seen(user_id, at).await
    }
}
