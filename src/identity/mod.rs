//! Identity boundary: snapshots of the authenticated user and the single
//! profile update operation the onboarding flow performs.

pub mod http;
pub mod local;
pub mod model;
pub mod service;

pub use http::HttpIdentityService;
pub use local::{LocalIdentityStore, RecordedUpdate};
pub use model::{Identity, IdentitySnapshot, ProfileView, metadata_keys};
pub use service::{IdentityContext, IdentityService, ProfileMetadata, ProfileUpdate};
