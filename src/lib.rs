//! CricScore onboarding: the profile-completion flow shown after sign-in.

pub mod config;
pub mod error;
pub mod identity;
pub mod onboarding;
