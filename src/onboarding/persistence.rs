//! PersistenceClient: commits a finished profile through the identity service.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::identity::IdentityService;

use super::model::ReadyProfile;

/// Writes a ready profile to one identity with a single update call.
///
/// No retries happen here; the user retries by saving again.
pub struct PersistenceClient {
    service: Arc<dyn IdentityService>,
    identity_id: String,
}

impl PersistenceClient {
    pub fn new(service: Arc<dyn IdentityService>, identity_id: impl Into<String>) -> Self {
        Self {
            service,
            identity_id: identity_id.into(),
        }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    /// Mark the profile complete together with team, role and (if given) username.
    pub async fn commit(&self, profile: &ReadyProfile) -> Result<(), PersistenceError> {
        let update = profile.to_update();
        info!(
            identity_id = %self.identity_id,
            service = self.service.name(),
            team = %profile.favorite_team,
            role = %profile.role,
            with_username = update.username.is_some(),
            "Committing onboarding profile"
        );

        self.service
            .update(&self.identity_id, &update)
            .await
            .map_err(|source| {
                warn!(identity_id = %self.identity_id, error = %source, "Profile commit failed");
                PersistenceError::Write {
                    identity_id: self.identity_id.clone(),
                    source,
                }
            })
    }
}
