//! Step and visibility state machines for the onboarding flow.

use serde::{Deserialize, Serialize};

/// Steps of one onboarding flow instance.
///
/// Progresses linearly: Intro → Form → Done. Skipping from Intro closes the
/// flow without leaving the step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Intro,
    Form,
    Done,
}

impl StepState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: StepState) -> bool {
        use StepState::*;
        matches!((self, target), (Intro, Form) | (Form, Done))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intro => "intro",
            Self::Form => "form",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Whether the onboarding overlay is on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingVisibility {
    #[default]
    Hidden,
    Visible,
    /// Still on screen, fading out.
    Closing,
}

impl OnboardingVisibility {
    /// Hidden → Visible → Closing → Hidden.
    pub fn can_transition_to(&self, target: OnboardingVisibility) -> bool {
        use OnboardingVisibility::*;
        matches!(
            (self, target),
            (Hidden, Visible) | (Visible, Closing) | (Closing, Hidden)
        )
    }

    pub fn is_on_screen(&self) -> bool {
        !matches!(self, Self::Hidden)
    }
}

impl std::fmt::Display for OnboardingVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hidden => "hidden",
            Self::Visible => "visible",
            Self::Closing => "closing",
        };
        write!(f, "{s}")
    }
}
