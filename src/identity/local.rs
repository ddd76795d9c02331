//! In-process identity store.
//!
//! Publishes snapshots over a watch channel and applies profile updates to
//! the signed-in identity. Used by the demo binary and by tests, which can
//! queue simulated failures and add latency to every write.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::IdentityError;

use super::model::{Identity, IdentitySnapshot};
use super::service::{IdentityContext, IdentityService, ProfileUpdate};

/// One call to [`IdentityService::update`], as the store saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpdate {
    pub identity_id: String,
    pub update: ProfileUpdate,
    pub succeeded: bool,
}

/// Identity store kept entirely in memory.
pub struct LocalIdentityStore {
    tx: watch::Sender<IdentitySnapshot>,
    latency: Duration,
    failures: Mutex<VecDeque<IdentityError>>,
    calls: Mutex<Vec<RecordedUpdate>>,
}

impl LocalIdentityStore {
    /// Create a store whose session state is still loading.
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    /// Create a store where every update takes `latency` to complete.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        let (tx, _rx) = watch::channel(IdentitySnapshot::loading());
        Arc::new(Self {
            tx,
            latency,
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Context handing this store to the onboarding components.
    pub fn context(self: &Arc<Self>) -> IdentityContext {
        let service: Arc<dyn IdentityService> = Arc::clone(self) as Arc<dyn IdentityService>;
        IdentityContext::new(self.tx.subscribe(), service)
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        self.tx.borrow().clone()
    }

    /// Back to the not-loaded state, as while a session is being restored.
    pub fn set_loading(&self) {
        self.tx.send_replace(IdentitySnapshot::loading());
    }

    pub fn sign_in(&self, identity: Identity) {
        info!(identity_id = %identity.id, "Identity signed in");
        self.tx.send_replace(IdentitySnapshot::signed_in(identity));
    }

    pub fn sign_out(&self) {
        info!("Identity signed out");
        self.tx.send_replace(IdentitySnapshot::signed_out());
    }

    /// Make the next update fail with `error`. Queued failures are used in order.
    pub async fn fail_next_update(&self, error: IdentityError) {
        self.failures.lock().await.push_back(error);
    }

    /// Every update call received so far, failed ones included.
    pub async fn calls(&self) -> Vec<RecordedUpdate> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, identity_id: &str, update: &ProfileUpdate, succeeded: bool) {
        self.calls.lock().await.push(RecordedUpdate {
            identity_id: identity_id.to_string(),
            update: update.clone(),
            succeeded,
        });
    }

    fn apply(&self, identity_id: &str, update: &ProfileUpdate) -> Result<(), IdentityError> {
        let metadata = match serde_json::to_value(&update.metadata) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(IdentityError::Unavailable("metadata is not an object".into())),
            Err(e) => return Err(IdentityError::Unavailable(e.to_string())),
        };

        let mut result = Err(IdentityError::NotSignedIn);
        self.tx.send_if_modified(|snapshot| {
            if !snapshot.qualifies() {
                return false;
            }
            let Some(identity) = snapshot.identity.as_mut() else {
                return false;
            };
            if identity.id != identity_id {
                return false;
            }
            if let Some(ref username) = update.username {
                identity.username = Some(username.clone());
            }
            identity.metadata.extend(metadata);
            result = Ok(());
            true
        });
        result
    }
}

#[async_trait]
impl IdentityService for LocalIdentityStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn update(
        &self,
        identity_id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), IdentityError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            warn!(identity_id, error = %error, "Simulated identity update failure");
            self.record(identity_id, update, false).await;
            return Err(error);
        }

        let result = self.apply(identity_id, update);
        self.record(identity_id, update, result.is_ok()).await;
        if result.is_ok() {
            debug!(identity_id, "Identity metadata updated");
        }
        result
    }
}
