//! Roles, authenticated identities and topic derivation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, ScoutId, UserId};
use crate::topic::Topic;

/// A portal role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Parent of one or more scouts.
    Parent,
    /// Leader of one or more groups.
    Leader,
    /// Organization executive.
    Executive,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Leader => "leader",
            Self::Executive => "executive",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "leader" => Ok(Self::Leader),
            "executive" => Ok(Self::Executive),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One scout a parent is linked to, with the scout's group when assigned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutLink {
    /// The scout.
    pub scout_id: ScoutId,
    /// The scout's group, if the scout has been placed in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// The organizational relationships that resolved for a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relationships {
    /// Groups the user leads.
    pub groups_led: Vec<GroupId>,
    /// Scouts the user parents.
    pub scouts: Vec<ScoutLink>,
}

/// An authenticated user and the topics it belongs to.
///
/// Rebuilt on every authentication so relationship changes in the store
/// take effect on the next connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// The user.
    pub user_id: UserId,
    /// The user's role.
    pub role: Role,
    /// Topics the user's connections join.
    pub topics: BTreeSet<Topic>,
}

impl UserIdentity {
    /// Build an identity, deriving its topics from `relationships`.
    pub fn new(user_id: UserId, role: Role, relationships: &Relationships) -> Self {
        let topics = derive_topics(&user_id, role, relationships);
        Self {
            user_id,
            role,
            topics,
        }
    }
}

/// Compute the topic memberships of a user.
///
/// - every user: `user:<id>`
/// - leader: `group:<g>` for each group led
/// - parent: `scout:<s>` for each scout, plus `group:<g>` for each scout's group
/// - executive: `executives`
///
/// Relationships that do not apply to the role are ignored. Blank ids are
/// skipped.
pub fn derive_topics(user_id: &UserId, role: Role, relationships: &Relationships) -> BTreeSet<Topic> {
    let mut topics = BTreeSet::new();
    let _ = topics.insert(Topic::User(user_id.clone()));

    match role {
        Role::Leader => {
            for group in relationships.groups_led.iter().filter(|g| !g.is_blank()) {
                let _ = topics.insert(Topic::Group(group.clone()));
            }
        }
        Role::Parent => {
            for link in relationships.scouts.iter().filter(|l| !l.scout_id.is_blank()) {
                let _ = topics.insert(Topic::Scout(link.scout_id.clone()));
                if let Some(group) = link.group_id.as_ref().filter(|g| !g.is_blank()) {
                    let _ = topics.insert(Topic::Group(group.clone()));
                }
            }
        }
        Role::Executive => {
            let _ = topics.insert(Topic::Executives);
        }
    }

    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn link(scout: &str, group: Option<&str>) -> ScoutLink {
        ScoutLink {
            scout_id: scout.into(),
            group_id: group.map(GroupId::from),
        }
    }

    fn topic_strings(topics: &BTreeSet<Topic>) -> Vec<String> {
        topics.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn leader_joins_led_groups() {
        let rel = Relationships {
            groups_led: vec!["g1".into(), "g2".into()],
            scouts: vec![],
        };
        let topics = derive_topics(&"l1".into(), Role::Leader, &rel);
        assert_eq!(topic_strings(&topics), ["user:l1", "group:g1", "group:g2"]);
    }

    #[test]
    fn parent_joins_scouts_and_their_groups() {
        let rel = Relationships {
            groups_led: vec![],
            scouts: vec![link("s1", Some("g1")), link("s2", Some("g1")), link("s3", None)],
        };
        let topics = derive_topics(&"p1".into(), Role::Parent, &rel);
        assert_eq!(
            topic_strings(&topics),
            ["user:p1", "group:g1", "scout:s1", "scout:s2", "scout:s3"]
        );
    }

    #[test]
    fn executive_joins_executives() {
        let topics = derive_topics(&"e1".into(), Role::Executive, &Relationships::default());
        assert_eq!(topic_strings(&topics), ["user:e1", "executives"]);
    }

    #[test]
    fn relationships_outside_the_role_are_ignored() {
        let rel = Relationships {
            groups_led: vec!["g1".into()],
            scouts: vec![link("s1", Some("g2"))],
        };
        let topics = derive_topics(&"e1".into(), Role::Executive, &rel);
        assert_eq!(topic_strings(&topics), ["user:e1", "executives"]);
    }

    #[test]
    fn blank_ids_are_skipped() {
        let rel = Relationships {
            groups_led: vec![],
            scouts: vec![link("", Some("g1")), link("s1", Some(" "))],
        };
        let topics = derive_topics(&"p1".into(), Role::Parent, &rel);
        assert_eq!(topic_strings(&topics), ["user:p1", "scout:s1"]);
    }

    #[test]
    fn identity_new_derives_topics() {
        let identity = UserIdentity::new("l1".into(), Role::Leader, &Relationships {
            groups_led: vec!["g1".into()],
            scouts: vec![],
        });
        assert!(identity.topics.contains(&Topic::Group("g1".into())));
        assert!(identity.topics.contains(&Topic::User("l1".into())));
    }

    #[test]
    fn role_parse_and_display() {
        assert_eq!("Leader".parse::<Role>().unwrap(), Role::Leader);
        assert_eq!(Role::Executive.to_string(), "executive");
        assert!("admin".parse::<Role>().is_err());
        let json = serde_json::to_string(&Role::Parent).unwrap();
        assert_eq!(json, "\"parent\"");
    }

    #[test]
    fn scout_link_wire_shape() {
        let parsed: ScoutLink = serde_json::from_str(r#"{"scoutId":"s1","groupId":"g1"}"#).unwrap();
        assert_eq!(parsed, link("s1", Some("g1")));
        let no_group: ScoutLink = serde_json::from_str(r#"{"scoutId":"s2"}"#).unwrap();
        assert_eq!(no_group.group_id, None);
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::Parent), Just(Role::Leader), Just(Role::Executive)]
    }

    proptest! {
        #[test]
        fn own_user_topic_always_present(
            role in role_strategy(),
            groups in proptest::collection::vec("[a-z0-9]{1,4}", 0..5),
            scouts in proptest::collection::vec(("[a-z0-9]{1,4}", proptest::option::of("[a-z0-9]{1,4}")), 0..5),
        ) {
            let rel = Relationships {
                groups_led: groups.into_iter().map(GroupId::from).collect(),
                scouts: scouts
                    .into_iter()
                    .map(|(s, g)| ScoutLink { scout_id: s.into(), group_id: g.map(GroupId::from) })
                    .collect(),
            };
            let user = UserId::from("me");
            let topics = derive_topics(&user, role, &rel);
            prop_assert!(topics.contains(&Topic::User(user.clone())));
            prop_assert_eq!(topics.contains(&Topic::Executives), role == Role::Executive);
        }
    }
}
