//! OnboardingGate: decides from identity snapshots alone when the onboarding
//! flow should be shown.
//!
//! The gate evaluates only while the snapshot is loaded and signed in. The
//! first qualifying snapshot of a session with an incomplete profile
//! schedules a trigger after `trigger_delay`; leaving the qualifying state
//! before then cancels it. A manual request fires at once.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::identity::IdentitySnapshot;

use super::timer::ScheduledTask;

/// Why a trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Incomplete profile noticed after sign-in, once the delay elapsed.
    Scheduled,
    /// The user asked to complete their profile.
    Manual,
}

/// Receiver of gate triggers.
pub trait TriggerSink: Send + Sync + 'static {
    fn fire(&self, source: TriggerSource);
}

impl TriggerSink for mpsc::UnboundedSender<TriggerSource> {
    fn fire(&self, source: TriggerSource) {
        let _ = self.send(source);
    }
}

/// Whether the header should offer the "complete profile" reminder.
pub fn reminder_visible(snapshot: &IdentitySnapshot) -> bool {
    snapshot.qualifies() && !snapshot.profile_complete()
}

#[derive(Default)]
struct GateState {
    /// Identity of the qualifying session (loaded + signed in) that was
    /// already evaluated.
    session: Option<String>,
    /// Bumped whenever a pending trigger is invalidated.
    generation: u64,
    pending: Option<ScheduledTask>,
    closed: bool,
}

impl GateState {
    fn cancel_pending(&mut self) -> bool {
        self.generation += 1;
        self.pending.take().is_some_and(|task| {
            let was_pending = !task.is_finished();
            task.cancel();
            was_pending
        })
    }
}

/// Watches identity snapshots and fires onboarding triggers.
pub struct OnboardingGate {
    state: Arc<Mutex<GateState>>,
    delay: Duration,
    sink: Arc<dyn TriggerSink>,
}

impl OnboardingGate {
    pub fn new(delay: Duration, sink: impl TriggerSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            delay,
            sink: Arc::new(sink),
        }
    }

    /// Evaluate one snapshot.
    pub async fn observe(&self, snapshot: &IdentitySnapshot) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }

        let identity_id = match snapshot.identity.as_ref() {
            Some(identity) if snapshot.qualifies() => identity.id.as_str(),
            _ => {
                if state.cancel_pending() {
                    debug!("Identity left the signed-in state; pending onboarding trigger cancelled");
                }
                state.session = None;
                return;
            }
        };

        if state.session.as_deref().is_some_and(|id| id != identity_id) {
            if state.cancel_pending() {
                debug!(identity_id, "Signed-in identity changed; pending onboarding trigger cancelled");
            }
            state.session = None;
        }

        if snapshot.profile_complete() {
            if state.cancel_pending() {
                debug!("Profile completed; pending onboarding trigger cancelled");
            }
            state.session = Some(identity_id.to_string());
            return;
        }

        if state.session.is_some() {
            return;
        }
        state.session = Some(identity_id.to_string());
        state.generation += 1;
        let generation = state.generation;

        debug!(
            delay_ms = self.delay.as_millis() as u64,
            "Incomplete profile; scheduling onboarding trigger"
        );
        let weak = Arc::downgrade(&self.state);
        let sink = Arc::clone(&self.sink);
        state.pending = Some(ScheduledTask::after(
            self.delay,
            fire_if_current(weak, generation, sink),
        ));
    }

    /// Fire a trigger now, regardless of earlier triggers.
    pub async fn request_now(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.cancel_pending();
        info!("Onboarding requested by user");
        self.sink.fire(TriggerSource::Manual);
    }

    /// Whether a scheduled trigger is waiting for its delay.
    pub async fn has_pending(&self) -> bool {
        let state = self.state.lock().await;
        state.pending.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Tear down: cancel any pending trigger and ignore later snapshots.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.cancel_pending();
        state.closed = true;
    }

    /// Drive the gate from an identity subscription until the sender goes away.
    pub fn spawn_watch(
        self: Arc<Self>,
        mut snapshots: watch::Receiver<IdentitySnapshot>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let snapshot = snapshots.borrow_and_update().clone();
                self.observe(&snapshot).await;
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
            self.shutdown().await;
        })
    }
}

async fn fire_if_current(state: Weak<Mutex<GateState>>, generation: u64, sink: Arc<dyn TriggerSink>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let state = state.lock().await;
    if state.closed || state.generation != generation {
        return;
    }
    info!("Onboarding trigger fired");
    sink.fire(TriggerSource::Scheduled);
}
