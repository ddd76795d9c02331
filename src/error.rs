//! Error types for the onboarding core.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reported by the external identity service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity service rejected the update ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Identity service unreachable: {0}")]
    Transport(String),

    #[error("No signed-in identity")]
    NotSignedIn,

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// Failure to commit a profile through the identity service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("Profile write for {identity_id} failed: {source}")]
    Write {
        identity_id: String,
        #[source]
        source: IdentityError,
    },
}

impl PersistenceError {
    /// The identity service's reason, suitable for showing to the user.
    pub fn reason(&self) -> String {
        match self {
            Self::Write { source, .. } => source.to_string(),
        }
    }
}

/// An action that is not valid in the flow's current step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("Cannot {action} while in step {step}")]
    InvalidAction { action: &'static str, step: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
