//! Hosted identity API over HTTP.
//!
//! `PATCH {base}/v1/users/{id}` with the username and the profile keys under
//! `unsafe_metadata`, authenticated with a bearer secret.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::IdentityApiConfig;
use crate::error::IdentityError;

use super::model::Identity;
use super::service::{IdentityService, ProfileMetadata, ProfileUpdate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct UserPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    unsafe_metadata: &'a ProfileMetadata,
}

/// User record as the API returns it.
#[derive(Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    unsafe_metadata: Map<String, Value>,
}

impl From<UserRecord> for Identity {
    fn from(record: UserRecord) -> Self {
        Identity {
            id: record.id,
            display_name: record.first_name,
            username: record.username,
            metadata: record.unsafe_metadata,
        }
    }
}

/// Identity service backed by the hosted user API.
pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpIdentityService {
    pub fn new(config: &IdentityApiConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn user_url(&self, identity_id: &str) -> String {
        format!("{}/v1/users/{}", self.base_url, identity_id)
    }

    /// Load the user record for `identity_id`.
    pub async fn fetch(&self, identity_id: &str) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .get(self.user_url(identity_id))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }

        let record: UserRecord = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("malformed user record: {e}")))?;
        Ok(record.into())
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    fn name(&self) -> &str {
        "http"
    }

    async fn update(
        &self,
        identity_id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), IdentityError> {
        let body = UserPatch {
            username: update.username.as_deref(),
            unsafe_metadata: &update.metadata,
        };

        let response = self
            .client
            .patch(self.user_url(identity_id))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(identity_id, status = status.as_u16(), "Identity update accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let error = rejection(status, &text);
        warn!(identity_id, status = status.as_u16(), error = %error, "Identity update rejected");
        Err(error)
    }
}

fn rejection(status: reqwest::StatusCode, body: &str) -> IdentityError {
    let reason = error_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.trim().to_string()
        }
    });
    IdentityError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

/// First `errors[].message` of an API error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("errors")?
        .get(0)?
        .get("message")?
        .as_str()
        .map(String::from)
}
