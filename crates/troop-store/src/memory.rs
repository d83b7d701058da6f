//! In-memory [`OrgStore`].
//!
//! Enforces the same referential rules the relational store does: writes
//! naming an unknown user, scout, event or group fail with `NotFound`.
//! Attendance is keyed by `(event, scout)`, so replaying an RSVP updates
//! the existing row instead of inserting a duplicate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use troop_core::{
    Achievement, AchievementId, Attendance, AttendanceId, AttendanceStatus, ChatMessage, Document,
    DocumentId, DocumentMeta, EventId, GroupId, MessageId, Role, ScoutId, ScoutLink, UserId,
};

use crate::error::{Result, StoreError};
use crate::seed::Seed;
use crate::{OrgStore, UserRecord};

#[derive(Debug, Default)]
struct ScoutRow {
    group_id: Option<GroupId>,
    parents: BTreeSet<UserId>,
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<UserId, UserRecord>,
    group_leaders: BTreeMap<GroupId, BTreeSet<UserId>>,
    scouts: BTreeMap<ScoutId, ScoutRow>,
    events: BTreeSet<EventId>,
    messages: Vec<ChatMessage>,
    attendance: HashMap<(EventId, ScoutId), Attendance>,
    achievements: Vec<Achievement>,
    documents: Vec<Document>,
    last_seen: HashMap<UserId, DateTime<Utc>>,
}

impl Inner {
    fn require_user(&self, id: &UserId) -> Result<()> {
        if self.users.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::not_found("user", id.as_str()))
        }
    }

    fn require_scout(&self, id: &ScoutId) -> Result<()> {
        if self.scouts.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::not_found("scout", id.as_str()))
        }
    }

    fn require_group(&self, id: &GroupId) -> Result<()> {
        if self.group_leaders.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::not_found("group", id.as_str()))
        }
    }
}

/// Organization store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed.
    pub fn from_seed(seed: Seed) -> Self {
        let mut store = Self::new();
        for user in seed.users {
            store = store.with_user(user.id, user.role, &user.display_name);
        }
        for group in seed.groups {
            let inner = store.inner.get_mut();
            inner
                .group_leaders
                .entry(group.id)
                .or_default()
                .extend(group.leaders);
        }
        for scout in seed.scouts {
            let inner = store.inner.get_mut();
            if let Some(group) = &scout.group_id {
                let _ = inner.group_leaders.entry(group.clone()).or_default();
            }
            let row = inner.scouts.entry(scout.id).or_default();
            row.group_id = scout.group_id;
            row.parents.extend(scout.parents);
        }
        store.inner.get_mut().events.extend(seed.events);
        store
    }

    /// Build a store from a JSON seed file.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let store = Self::from_seed(Seed::from_file(path)?);
        {
            let inner = store.inner.read();
            info!(
                path = %path.display(),
                users = inner.users.len(),
                groups = inner.group_leaders.len(),
                scouts = inner.scouts.len(),
                events = inner.events.len(),
                "memory store seeded"
            );
        }
        Ok(store)
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(mut self, id: impl Into<UserId>, role: Role, display_name: &str) -> Self {
        let id = id.into();
        let _ = self.inner.get_mut().users.insert(
            id.clone(),
            UserRecord {
                id,
                role,
                display_name: display_name.to_owned(),
            },
        );
        self
    }

    /// Add a group, optionally led by `leader`.
    #[must_use]
    pub fn with_group(mut self, id: impl Into<GroupId>, leader: Option<&str>) -> Self {
        let leaders = self.inner.get_mut().group_leaders.entry(id.into()).or_default();
        if let Some(leader) = leader {
            let _ = leaders.insert(UserId::from(leader));
        }
        self
    }

    /// Add a scout in `group` (if any) with the given parents.
    #[must_use]
    pub fn with_scout(
        mut self,
        id: impl Into<ScoutId>,
        group: Option<&str>,
        parents: &[&str],
    ) -> Self {
        let inner = self.inner.get_mut();
        if let Some(group) = group {
            let _ = inner.group_leaders.entry(GroupId::from(group)).or_default();
        }
        let row = inner.scouts.entry(id.into()).or_default();
        row.group_id = group.map(GroupId::from);
        row.parents.extend(parents.iter().map(|p| UserId::from(*p)));
        self
    }

    /// Add a calendar event.
    #[must_use]
    pub fn with_event(mut self, id: impl Into<EventId>) -> Self {
        let _ = self.inner.get_mut().events.insert(id.into());
        self
    }

    /// All persisted messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.read().messages.clone()
    }

    /// All attendance rows.
    pub fn attendance_rows(&self) -> Vec<Attendance> {
        self.inner.read().attendance.values().cloned().collect()
    }

    /// All persisted achievements.
    pub fn achievements(&self) -> Vec<Achievement> {
        self.inner.read().achievements.clone()
    }

    /// All persisted documents.
    pub fn documents(&self) -> Vec<Document> {
        self.inner.read().documents.clone()
    }

    /// Last-seen timestamp recorded for a user.
    pub fn last_seen(&self, user_id: &UserId) -> Option<DateTime<Utc>> {
        self.inner.read().last_seen.get(user_id).copied()
    }
}

#[async_trait]
impl OrgStore for MemoryStore {
    async fn lookup_user(&self, user_id: &UserId) -> Result<UserRecord> {
        self.inner
            .read()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", user_id.as_str()))
    }

    async fn groups_led_by(&self, user_id: &UserId) -> Result<Vec<GroupId>> {
        let inner = self.inner.read();
        inner.require_user(user_id)?;
        Ok(inner
            .group_leaders
            .iter()
            .filter(|(_, leaders)| leaders.contains(user_id))
            .map(|(group, _)| group.clone())
            .collect())
    }

    async fn scouts_parented_by(&self, user_id: &UserId) -> Result<Vec<ScoutLink>> {
        let inner = self.inner.read();
        inner.require_user(user_id)?;
        Ok(inner
            .scouts
            .iter()
            .filter(|(_, row)| row.parents.contains(user_id))
            .map(|(scout, row)| ScoutLink {
                scout_id: scout.clone(),
                group_id: row.group_id.clone(),
            })
            .collect())
    }

    async fn lookup_scout(&self, scout: &ScoutId) -> Result<ScoutLink> {
        self.inner
            .read()
            .scouts
            .get(scout)
            .map(|row| ScoutLink {
                scout_id: scout.clone(),
                group_id: row.group_id.clone(),
            })
            .ok_or_else(|| StoreError::not_found("scout", scout.as_str()))
    }

    async fn require_group(&self, group: &GroupId) -> Result<()> {
        self.inner.read().require_group(group)
    }

    async fn create_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> Result<ChatMessage> {
        let mut inner = self.inner.write();
        inner.require_user(sender)?;
        inner.require_user(receiver)?;
        let message = ChatMessage {
            id: MessageId::new(),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            content: content.to_owned(),
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());
        debug!(message_id = %message.id, "message stored");
        Ok(message)
    }

    async fn upsert_attendance(
        &self,
        event: &EventId,
        scout: &ScoutId,
        acting_user: &UserId,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        let mut inner = self.inner.write();
        if !inner.events.contains(event) {
            return Err(StoreError::not_found("event", event.as_str()));
        }
        inner.require_scout(scout)?;
        inner.require_user(acting_user)?;

        let now = Utc::now();
        let row = inner
            .attendance
            .entry((event.clone(), scout.clone()))
            .and_modify(|row| {
                row.user_id = acting_user.clone();
                row.status = status;
                row.updated_at = now;
            })
            .or_insert_with(|| Attendance {
                id: AttendanceId::new(),
                event_id: event.clone(),
                scout_id: scout.clone(),
                user_id: acting_user.clone(),
                status,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn create_achievement(
        &self,
        scout: &ScoutId,
        name: &str,
        description: &str,
    ) -> Result<Achievement> {
        let mut inner = self.inner.write();
        inner.require_scout(scout)?;
        let achievement = Achievement {
            id: AchievementId::new(),
            scout_id: scout.clone(),
            name: name.to_owned(),
            description: description.to_owned(),
            awarded_at: Utc::now(),
        };
        inner.achievements.push(achievement.clone());
        Ok(achievement)
    }

    async fn create_document(&self, meta: DocumentMeta) -> Result<Document> {
        let mut inner = self.inner.write();
        inner.require_user(&meta.uploaded_by)?;
        if let Some(group) = &meta.group_id {
            inner.require_group(group)?;
        }
        let document = Document {
            id: DocumentId::new(),
            meta,
            created_at: Utc::now(),
        };
        inner.documents.push(document.clone());
        Ok(document)
    }

    async fn record_last_seen(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        inner.require_user(user_id)?;
        let _ = inner.last_seen.insert(user_id.clone(), at);
        Ok(())
    }
}
