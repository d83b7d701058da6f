//! JSON seed for [`MemoryStore`](crate::MemoryStore).
//!
//! ```json
//! {
//!   "users":  [{ "id": "l1", "role": "leader", "displayName": "Akela" }],
//!   "groups": [{ "id": "g1", "leaders": ["l1"] }],
//!   "scouts": [{ "id": "s1", "groupId": "g1", "parents": ["p1"] }],
//!   "events": ["camp-2026"]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use troop_core::{EventId, GroupId, ScoutId, UserId};

use crate::UserRecord;
use crate::error::Result;

/// A group and its leaders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedGroup {
    /// Group id.
    pub id: GroupId,
    /// Leaders of the group.
    pub leaders: Vec<UserId>,
}

/// A scout, its group and its parents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedScout {
    /// Scout id.
    pub id: ScoutId,
    /// Group the scout belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Parents of the scout.
    pub parents: Vec<UserId>,
}

/// Initial contents of an in-memory store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Seed {
    /// Users.
    pub users: Vec<UserRecord>,
    /// Groups.
    pub groups: Vec<SeedGroup>,
    /// Scouts.
    pub scouts: Vec<SeedScout>,
    /// Calendar events scouts can RSVP to.
    pub events: Vec<EventId>,
}

impl Seed {
    /// Read a seed from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;
    use troop_core::Role;

    const SAMPLE: &str = r#"{
        "users": [
            {"id": "l1", "role": "leader", "displayName": "Akela"},
            {"id": "p1", "role": "parent"}
        ],
        "groups": [{"id": "g1", "leaders": ["l1"]}],
        "scouts": [{"id": "s1", "groupId": "g1", "parents": ["p1"]}],
        "events": ["ev1"]
    }"#;

    #[test]
    fn parses_sample() {
        let seed: Seed = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(seed.users.len(), 2);
        assert_eq!(seed.users[0].role, Role::Leader);
        assert_eq!(seed.users[1].display_name, "");
        assert_eq!(seed.groups[0].leaders, vec![UserId::from("l1")]);
        assert_eq!(seed.scouts[0].group_id, Some(GroupId::from("g1")));
        assert_eq!(seed.events, vec![EventId::from("ev1")]);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let seed: Seed = serde_json::from_str(r#"{"events": ["ev1"]}"#).unwrap();
        assert!(seed.users.is_empty());
        assert!(seed.scouts.is_empty());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let seed = Seed::from_file(&path).unwrap();
        assert_eq!(seed.groups.len(), 1);
    }

    #[test]
    fn from_file_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Seed::from_file(&path), Err(StoreError::Seed(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let result = Seed::from_file(Path::new("/nonexistent/seed.json"));
        assert!(matches!(result, Err(StoreError::Seed(_))));
    }
}
