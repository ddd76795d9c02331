//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Timing for the onboarding flow.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Delay between a qualifying identity snapshot and the trigger, so the
    /// page can settle before it is interrupted.
    pub trigger_delay: Duration,
    /// How long the "all set" screen stays up before the flow starts closing.
    pub done_display_delay: Duration,
    /// Fade-out between `closing` and `hidden`.
    pub fade_out_delay: Duration,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            trigger_delay: Duration::from_millis(700),
            done_display_delay: Duration::from_millis(1800),
            fade_out_delay: Duration::from_millis(400),
        }
    }
}

impl OnboardingConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            trigger_delay: millis_from_env("CRICSCORE_TRIGGER_DELAY_MS", defaults.trigger_delay)?,
            done_display_delay: millis_from_env(
                "CRICSCORE_DONE_DELAY_MS",
                defaults.done_display_delay,
            )?,
            fade_out_delay: millis_from_env("CRICSCORE_FADE_DELAY_MS", defaults.fade_out_delay)?,
        })
    }
}

/// Hosted identity API settings.
#[derive(Debug, Clone)]
pub struct IdentityApiConfig {
    pub base_url: String,
    pub api_key: SecretString,
    /// The signed-in user whose profile the flow completes.
    pub user_id: String,
}

impl IdentityApiConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `CRICSCORE_IDENTITY_API_URL` is not set (local store).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(base_url) = std::env::var("CRICSCORE_IDENTITY_API_URL") else {
            return Ok(None);
        };
        let api_key = std::env::var("CRICSCORE_IDENTITY_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("CRICSCORE_IDENTITY_API_KEY".to_string()))?;
        let user_id = std::env::var("CRICSCORE_IDENTITY_USER_ID")
            .map_err(|_| ConfigError::MissingEnvVar("CRICSCORE_IDENTITY_USER_ID".to_string()))?;

        Ok(Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
            user_id,
        }))
    }
}

fn millis_from_env(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_millis(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected milliseconds, got {raw:?} ({e})"),
        })
}
