//! Topic addressing.
//!
//! A topic is a named subscription channel. Its string form is what clients
//! see in the `authenticated` event and what log lines print:
//! `user:<id>`, `group:<id>`, `scout:<id>` or `executives`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{GroupId, ScoutId, UserId};

/// A subscription channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    /// Every connection of one user.
    User(UserId),
    /// Leaders of a group and parents of its scouts.
    Group(GroupId),
    /// Parents of one scout.
    Scout(ScoutId),
    /// All executives.
    Executives,
}

impl Topic {
    /// Short kind label, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
            Self::Scout(_) => "scout",
            Self::Executives => "executives",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Group(id) => write!(f, "group:{id}"),
            Self::Scout(id) => write!(f, "scout:{id}"),
            Self::Executives => f.write_str("executives"),
        }
    }
}

/// A topic string that does not follow the addressing scheme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid topic: {0:?}")]
pub struct TopicParseError(pub String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "executives" {
            return Ok(Self::Executives);
        }
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| TopicParseError(s.to_owned()))?;
        if id.trim().is_empty() {
            return Err(TopicParseError(s.to_owned()));
        }
        match kind {
            "user" => Ok(Self::User(UserId::from(id))),
            "group" => Ok(Self::Group(GroupId::from(id))),
            "scout" => Ok(Self::Scout(ScoutId::from(id))),
            _ => Err(TopicParseError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}
