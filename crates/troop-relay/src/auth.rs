//! Session authentication.
//!
//! A claim names a user and a role. The user must exist and the role must
//! match the stored one. Relationship lookups are best-effort: a failed
//! lookup costs the user some topics, not the connection.

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use troop_core::{Relationships, Role, UserId, UserIdentity};
use troop_store::{OrgStore, StoreError};

use crate::errors::AuthenticationError;
use crate::protocol::AuthClaim;

/// Resolves claims into identities.
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<dyn OrgStore>,
}

impl SessionAuthenticator {
    /// Authenticator backed by `store`.
    pub fn new(store: Arc<dyn OrgStore>) -> Self {
        Self { store }
    }

    /// Validate `claim` and compute the user's topics.
    #[instrument(skip_all, fields(user_id = %claim.user_id, role = %claim.role))]
    pub async fn authenticate(&self, claim: &AuthClaim) -> Result<UserIdentity, AuthenticationError> {
        if claim.user_id.is_blank() {
            return Err(AuthenticationError::MissingUserId);
        }

        let record = self
            .store
            .lookup_user(&claim.user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => AuthenticationError::UnknownUser(claim.user_id.clone()),
                other => AuthenticationError::StoreUnavailable(other.to_string()),
            })?;

        if record.role != claim.role {
            return Err(AuthenticationError::RoleMismatch {
                user_id: record.id,
                claimed: claim.role,
                stored: record.role,
            });
        }

        let relationships = self.relationships(&record.id, record.role).await;
        let identity = UserIdentity::new(record.id, record.role, &relationships);
        debug!(topics = identity.topics.len(), "identity resolved");
        Ok(identity)
    }

    async fn relationships(&self, user_id: &UserId, role: Role) -> Relationships {
        let mut relationships = Relationships::default();
        match role {
            Role::Leader => match self.store.groups_led_by(user_id).await {
                Ok(groups) => relationships.groups_led = groups,
                Err(err) => warn!(error = %err, "group lookup failed, continuing without group topics"),
            },
            Role::Parent => match self.store.scouts_parented_by(user_id).await {
                Ok(scouts) => relationships.scouts = scouts,
                Err(err) => warn!(error = %err, "scout lookup failed, continuing without scout topics"),
            },
            Role::Executive => {}
        }
        relationships
    }
}

impl std::fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthenticator").finish_non_exhaustive()
    }
}
