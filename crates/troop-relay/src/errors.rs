//! Relay error taxonomy.
//!
//! | Kind | Reach | Effect |
//! |---|---|---|
//! | [`AuthenticationError`] | the connecting socket | socket closed with 1008, nothing registered |
//! | [`ValidationError`] | the sender | `error` event, connection stays open |
//! | [`PersistenceError`] | the sender | `error` event, nothing fanned out |
//! | [`DeliveryError`] | one recipient | logged and counted, recipient dropped |

use thiserror::Error;
use troop_core::{GroupId, Role, ScoutId, UserId};
use troop_store::StoreError;

/// Wire codes carried by the `error` event.
pub mod codes {
    /// The socket could not be authenticated.
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
    /// The inbound event was rejected before any write.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    /// The store write failed.
    pub const PERSISTENCE_FAILED: &str = "PERSISTENCE_FAILED";
}

/// A connecting client could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// The claim carried a blank user id.
    #[error("userId is required")]
    MissingUserId,
    /// The store has no such user.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    /// The claimed role differs from the stored one.
    #[error("user {user_id} is a {stored}, not a {claimed}")]
    RoleMismatch {
        /// The user.
        user_id: UserId,
        /// Role the client claimed.
        claimed: Role,
        /// Role on record.
        stored: Role,
    },
    /// The user lookup failed for a reason other than a missing row.
    #[error("user store unavailable: {0}")]
    StoreUnavailable(String),
    /// A frame other than `authenticate` arrived first.
    #[error("the first event must be authenticate")]
    NotAuthenticated,
    /// No `authenticate` frame arrived in time.
    #[error("authentication timed out")]
    Timeout,
    /// The connection closed while authentication was in flight.
    #[error("connection closed during authentication")]
    ConnectionClosed,
}

/// An inbound event failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The frame is not a well-formed event.
    #[error("malformed event: {0}")]
    Malformed(String),
    /// A required field is empty.
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    /// Chat message over the configured limit.
    #[error("message exceeds {max} characters")]
    TooLong {
        /// Configured limit.
        max: usize,
    },
    /// An acting-user field names someone other than the socket's user.
    #[error("{field} does not match the authenticated user")]
    IdentityMismatch {
        /// The offending field.
        field: &'static str,
    },
    /// The named group is not the scout's group.
    #[error("scout {scout} is not in group {group}")]
    GroupMismatch {
        /// The scout.
        scout: ScoutId,
        /// Group the event named.
        group: GroupId,
    },
    /// `authenticate` sent on an already authenticated socket.
    #[error("connection is already authenticated")]
    AlreadyAuthenticated,
    /// The store does not know a referenced entity.
    #[error("{entity} not found: {id}")]
    UnknownReference {
        /// Entity kind.
        entity: &'static str,
        /// Referenced id.
        id: String,
    },
}

/// A store write failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {reason}")]
pub struct PersistenceError {
    /// Store operation that failed.
    pub operation: &'static str,
    /// Store message.
    pub reason: String,
}

/// One recipient could not be handed a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient's outbound queue is full.
    #[error("send queue full")]
    QueueFull,
    /// The recipient's writer has gone away.
    #[error("connection closed")]
    Closed,
}

/// Outcome of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// See [`AuthenticationError`].
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`PersistenceError`].
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RelayError {
    /// Classify a store failure. Unknown references are the caller's fault;
    /// everything else is the store's.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                ValidationError::UnknownReference { entity, id }.into()
            }
            other => PersistenceError {
                operation,
                reason: other.to_string(),
            }
            .into(),
        }
    }

    /// Wire code for the `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => codes::AUTHENTICATION_FAILED,
            Self::Validation(_) => codes::VALIDATION_FAILED,
            Self::Persistence(_) => codes::PERSISTENCE_FAILED,
        }
    }
}
