//! Branded ID newtypes.
//!
//! Ids issued by the organization store (users, groups, scouts, calendar
//! events) are opaque strings and are carried as-is. Ids minted by this
//! process (connections, and records created by the in-memory store) are
//! UUID v7 so they sort by creation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh time-ordered id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Borrow the raw id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the id is empty or whitespace only.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Consume and return the raw id.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// A portal user (parent, leader or executive).
    UserId
}

branded_id! {
    /// A scout group.
    GroupId
}

branded_id! {
    /// A scout (youth member).
    ScoutId
}

branded_id! {
    /// A calendar event that scouts RSVP to.
    EventId
}

branded_id! {
    /// One live socket. A user with two tabs has two.
    ConnectionId
}

branded_id! {
    /// A persisted chat message.
    MessageId
}

branded_id! {
    /// A persisted attendance row.
    AttendanceId
}

branded_id! {
    /// A persisted achievement award.
    AchievementId
}

branded_id! {
    /// A persisted document record.
    DocumentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn minted_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn store_ids_are_carried_verbatim() {
        let id = UserId::from("p1");
        assert_eq!(id.as_str(), "p1");
        assert_eq!(format!("{id}"), "p1");
        assert_eq!(id.into_inner(), "p1");
    }

    #[test]
    fn blank_detection() {
        assert!(GroupId::from("").is_blank());
        assert!(GroupId::from("  \t").is_blank());
        assert!(!GroupId::from("g1").is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ScoutId::from("s1")).unwrap();
        assert_eq!(json, "\"s1\"");
        let back: ScoutId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScoutId::from("s1"));
    }

    #[test]
    fn ordering_follows_string_order() {
        let mut ids = vec![UserId::from("b"), UserId::from("a"), UserId::from("c")];
        ids.sort();
        assert_eq!(ids, vec![UserId::from("a"), UserId::from("b"), UserId::from("c")]);
    }
}
