//! User-facing text for the onboarding screens.

pub const PRODUCT_NAME: &str = "CricScore";

/// Label of the header affordance that reopens the flow.
pub const REMINDER_LABEL: &str = "Complete profile ✦";

pub const INTRO_TITLE: &str = "Welcome to CricScore";
pub const FORM_TITLE: &str = "Your Profile";
pub const FORM_SUBTITLE: &str = "Helps us tailor scores, alerts & fantasy tips for you.";
pub const DONE_TITLE: &str = "You're all set!";

pub const SAVE_LABEL: &str = "Save & Continue →";
pub const SAVING_LABEL: &str = "Saving…";

fn name_or<'a>(display_name: Option<&'a str>, fallback: &'a str) -> &'a str {
    display_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
}

/// Intro line, greeting the user by name when one is known.
pub fn intro_greeting(display_name: Option<&str>) -> String {
    format!(
        "Hey {}! Looks like you're new here. Take 30 seconds to personalise your experience.",
        name_or(display_name, "there")
    )
}

/// Line shown on the final step.
pub fn done_greeting(display_name: Option<&str>) -> String {
    format!(
        "Welcome to {PRODUCT_NAME}, {} 🏆",
        name_or(display_name, "champion")
    )
}
