//! The identity service boundary: the update operation and the context object
//! that hands snapshots and the service to the onboarding components.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::IdentityError;
use crate::onboarding::model::{Role, Team};

use super::model::IdentitySnapshot;

/// Profile keys written to identity metadata in one update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub profile_complete: bool,
    pub favorite_team: Team,
    pub role: Role,
}

/// Payload of the identity update operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// Omitted when `None` so the service keeps its current username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub metadata: ProfileMetadata,
}

/// The external identity service's write operation.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Apply `update` to the identity, all-or-nothing.
    async fn update(&self, identity_id: &str, update: &ProfileUpdate)
    -> Result<(), IdentityError>;
}

/// Explicitly passed identity dependency: current snapshot plus update operation.
#[derive(Clone)]
pub struct IdentityContext {
    snapshots: watch::Receiver<IdentitySnapshot>,
    service: Arc<dyn IdentityService>,
}

impl IdentityContext {
    pub fn new(
        snapshots: watch::Receiver<IdentitySnapshot>,
        service: Arc<dyn IdentityService>,
    ) -> Self {
        Self { snapshots, service }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> IdentitySnapshot {
        self.snapshots.borrow().clone()
    }

    /// A fresh receiver that sees every later snapshot.
    pub fn subscribe(&self) -> watch::Receiver<IdentitySnapshot> {
        self.snapshots.clone()
    }

    pub fn service(&self) -> Arc<dyn IdentityService> {
        Arc::clone(&self.service)
    }
}
