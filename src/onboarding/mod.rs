//! Onboarding flow: profile completion after sign-in.
//!
//! The gate watches identity snapshots and decides when to interrupt the
//! user. The host owns the overlay's visibility and opens one
//! `ProfileStepMachine` per episode. The machine collects team, role and an
//! optional username, and commits them through the `PersistenceClient`.

pub mod copy;
pub mod gate;
pub mod host;
pub mod machine;
pub mod model;
pub mod persistence;
pub mod state;
pub mod timer;

pub use gate::{OnboardingGate, TriggerSink, TriggerSource, reminder_visible};
pub use host::{HostTriggers, OnboardingFinished, OnboardingHost};
pub use machine::{FlowExit, FlowSignal, ProfileStepMachine, SaveFailure, SaveOutcome, StepSnapshot};
pub use model::{ProfileDraft, ReadyProfile, Role, Team, UnknownChoice};
pub use persistence::PersistenceClient;
pub use state::{OnboardingVisibility, StepState};
pub use timer::ScheduledTask;
