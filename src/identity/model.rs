//! Identity snapshot and the typed view over its open metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::onboarding::model::{Role, Team};

/// Metadata keys the onboarding flow reads and writes.
pub mod metadata_keys {
    pub const PROFILE_COMPLETE: &str = "profileComplete";
    pub const FAVORITE_TEAM: &str = "favoriteTeam";
    pub const ROLE: &str = "role";
}

/// An authenticated user as the identity service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Open key-value metadata. Only the keys in [`metadata_keys`] are interpreted.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            username: None,
            metadata: Map::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Typed view over the profile keys of `metadata`.
    pub fn profile(&self) -> ProfileView {
        ProfileView::from_metadata(&self.metadata)
    }
}

/// Narrow typed view of the profile attributes stored in identity metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileView {
    pub profile_complete: bool,
    pub favorite_team: Option<Team>,
    pub role: Option<Role>,
}

impl ProfileView {
    pub fn from_metadata(metadata: &Map<String, Value>) -> Self {
        let label = |key: &str| metadata.get(key).and_then(Value::as_str);
        Self {
            profile_complete: metadata
                .get(metadata_keys::PROFILE_COMPLETE)
                .is_some_and(is_truthy),
            favorite_team: label(metadata_keys::FAVORITE_TEAM).and_then(Team::from_label),
            role: label(metadata_keys::ROLE).and_then(Role::from_label),
        }
    }
}

/// Loose truthiness of a metadata value written by other clients: `false`,
/// `0`, `""` and `null` are falsy, everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Point-in-time view of the identity accessor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentitySnapshot {
    pub is_loaded: bool,
    pub is_signed_in: bool,
    pub identity: Option<Identity>,
}

impl IdentitySnapshot {
    /// Session state not yet known.
    pub fn loading() -> Self {
        Self::default()
    }

    pub fn signed_out() -> Self {
        Self {
            is_loaded: true,
            is_signed_in: false,
            identity: None,
        }
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            is_loaded: true,
            is_signed_in: true,
            identity: Some(identity),
        }
    }

    /// Loaded and signed in: the only state in which onboarding is evaluated.
    pub fn qualifies(&self) -> bool {
        self.is_loaded && self.is_signed_in
    }

    pub fn profile(&self) -> ProfileView {
        self.identity
            .as_ref()
            .map(Identity::profile)
            .unwrap_or_default()
    }

    pub fn profile_complete(&self) -> bool {
        self.profile().profile_complete
    }

    pub fn display_name(&self) -> Option<&str> {
        self.identity.as_ref()?.display_name.as_deref()
    }
}
