//! ProfileStepMachine: one instance of the onboarding flow.
//!
//! Observers read a [`StepSnapshot`] through a watch channel; it changes only
//! after a transition completes. The machine reports how it ended (skip or
//! completion) to its host as a [`FlowSignal`] tagged with its episode.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PersistenceError, StepError};

use super::copy;
use super::model::{ProfileDraft, Role, Team};
use super::persistence::PersistenceClient;
use super::state::StepState;
use super::timer::ScheduledTask;

/// How a flow instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowExit {
    Skipped,
    Completed,
}

/// Sent to the host when a flow instance wants to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSignal {
    pub episode: u64,
    pub exit: FlowExit,
}

/// A failed save, kept for display until the next successful one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveFailure {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Observable state of the flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepSnapshot {
    pub step: StepState,
    pub draft: ProfileDraft,
    /// A save is in flight.
    pub busy: bool,
    pub last_failure: Option<SaveFailure>,
    /// Skipped or finished; every further action is refused.
    pub closed: bool,
}

impl StepSnapshot {
    /// Whether the save action is currently offered.
    pub fn can_save(&self) -> bool {
        !self.closed && self.step == StepState::Form && self.draft.is_ready() && !self.busy
    }
}

/// Result of asking the machine to save.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Written; the flow moved to `Done`.
    Saved,
    /// The write failed; still on the form.
    Failed(SaveFailure),
    /// Team or role missing; nothing was written.
    NotReady,
    /// Another save is outstanding; this one was dropped.
    AlreadySaving,
}

/// Drives Intro → Form → Done for one visible episode.
pub struct ProfileStepMachine {
    id: Uuid,
    episode: u64,
    display_name: Option<String>,
    state: watch::Sender<StepSnapshot>,
    persistence: Arc<PersistenceClient>,
    signals: mpsc::UnboundedSender<FlowSignal>,
    done_delay: Duration,
    done_timer: Mutex<Option<ScheduledTask>>,
}

impl ProfileStepMachine {
    pub fn new(
        episode: u64,
        display_name: Option<String>,
        persistence: Arc<PersistenceClient>,
        done_delay: Duration,
        signals: mpsc::UnboundedSender<FlowSignal>,
    ) -> Self {
        let (state, _rx) = watch::channel(StepSnapshot::default());
        let id = Uuid::new_v4();
        debug!(flow_id = %id, episode, identity_id = persistence.identity_id(), "Flow created");
        Self {
            id,
            episode,
            display_name,
            state,
            persistence,
            signals,
            done_delay,
            done_timer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn snapshot(&self) -> StepSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StepSnapshot> {
        self.state.subscribe()
    }

    pub fn step(&self) -> StepState {
        self.state.borrow().step
    }

    pub fn intro_greeting(&self) -> String {
        copy::intro_greeting(self.display_name.as_deref())
    }

    pub fn done_greeting(&self) -> String {
        copy::done_greeting(self.display_name.as_deref())
    }

    /// Apply `edit` if the flow is open and in `required`; otherwise refuse.
    /// `edit` returns whether it changed anything observers should see.
    fn act<F>(&self, action: &'static str, required: StepState, edit: F) -> Result<(), StepError>
    where
        F: FnOnce(&mut StepSnapshot) -> bool,
    {
        let mut result = Ok(());
        self.state.send_if_modified(|s| {
            if s.closed || s.step != required {
                result = Err(StepError::InvalidAction {
                    action,
                    step: if s.closed { "closed".to_string() } else { s.step.to_string() },
                });
                return false;
            }
            edit(s)
        });
        if let Err(ref e) = result {
            debug!(flow_id = %self.id, error = %e, "Flow action refused");
        }
        result
    }

    /// Intro → Form.
    pub fn proceed(&self) -> Result<(), StepError> {
        self.act("proceed", StepState::Intro, |s| advance(s, StepState::Form))?;
        info!(flow_id = %self.id, "Onboarding form opened");
        Ok(())
    }

    /// Close from Intro without writing anything.
    pub fn skip(&self) -> Result<(), StepError> {
        self.act("skip", StepState::Intro, |s| {
            s.closed = true;
            s.draft = ProfileDraft::default();
            true
        })?;
        info!(flow_id = %self.id, "Onboarding skipped");
        self.signal(FlowExit::Skipped);
        Ok(())
    }

    pub fn set_username(&self, username: impl Into<String>) -> Result<(), StepError> {
        let username = username.into();
        self.act("edit username", StepState::Form, |s| {
            s.draft.username = username;
            true
        })
    }

    pub fn select_team(&self, team: Team) -> Result<(), StepError> {
        self.act("select team", StepState::Form, |s| {
            s.draft.favorite_team = Some(team);
            true
        })
    }

    pub fn select_role(&self, role: Role) -> Result<(), StepError> {
        self.act("select role", StepState::Form, |s| {
            s.draft.role = Some(role);
            true
        })
    }

    /// Commit the draft.
    ///
    /// Draft edits stay possible while the write is in flight; a second save
    /// issued meanwhile is dropped.
    pub async fn save(&self) -> Result<SaveOutcome, StepError> {
        let mut early = None;
        let mut profile = None;
        self.act("save", StepState::Form, |s| {
            if s.busy {
                early = Some(SaveOutcome::AlreadySaving);
                return false;
            }
            match s.draft.ready() {
                Some(ready) => {
                    s.busy = true;
                    profile = Some(ready);
                    true
                }
                None => {
                    early = Some(SaveOutcome::NotReady);
                    false
                }
            }
        })?;

        let Some(profile) = profile else {
            let outcome = early.unwrap_or(SaveOutcome::NotReady);
            debug!(flow_id = %self.id, ?outcome, "Save not started");
            return Ok(outcome);
        };

        let guard = BusyGuard {
            flow_id: self.id,
            state: &self.state,
            armed: true,
        };
        let result = self.persistence.commit(&profile).await;
        guard.disarm();

        match result {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.busy = false;
                    s.last_failure = None;
                    advance(s, StepState::Done);
                });
                info!(flow_id = %self.id, "Onboarding profile saved");
                self.schedule_completion().await;
                Ok(SaveOutcome::Saved)
            }
            Err(e) => Ok(SaveOutcome::Failed(self.record_failure(&e))),
        }
    }

    fn record_failure(&self, error: &PersistenceError) -> SaveFailure {
        let failure = SaveFailure {
            reason: error.reason(),
            failed_at: Utc::now(),
        };
        warn!(flow_id = %self.id, error = %error, "Onboarding save failed; user may retry");
        self.state.send_modify(|s| {
            s.busy = false;
            s.last_failure = Some(failure.clone());
        });
        failure
    }

    async fn schedule_completion(&self) {
        let signals = self.signals.clone();
        let signal = FlowSignal {
            episode: self.episode,
            exit: FlowExit::Completed,
        };
        let task = ScheduledTask::after(self.done_delay, async move {
            let _ = signals.send(signal);
        });
        *self.done_timer.lock().await = Some(task);
    }

    fn signal(&self, exit: FlowExit) {
        let _ = self.signals.send(FlowSignal {
            episode: self.episode,
            exit,
        });
    }
}

/// Moves `snapshot` to `target` if the step order allows it. Reaching a
/// terminal step closes the flow.
fn advance(snapshot: &mut StepSnapshot, target: StepState) -> bool {
    if !snapshot.step.can_transition_to(target) {
        warn!(from = %snapshot.step, to = %target, "Unexpected step transition");
        return false;
    }
    snapshot.step = target;
    if target.is_terminal() {
        snapshot.closed = true;
    }
    true
}

/// Clears `busy` when a save is abandoned before its write resolves.
struct BusyGuard<'a> {
    flow_id: Uuid,
    state: &'a watch::Sender<StepSnapshot>,
    armed: bool,
}

impl BusyGuard<'_> {
    /// The write resolved; the caller settles `busy` itself.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cleared = self.state.send_if_modified(|s| std::mem::replace(&mut s.busy, false));
        if cleared {
            debug!(flow_id = %self.flow_id, "Save abandoned before the write resolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IdentityError;
    use crate::identity::{Identity, LocalIdentityStore};

    const DONE_DELAY: Duration = Duration::from_millis(1800);

    struct Fixture {
        store: Arc<LocalIdentityStore>,
        machine: ProfileStepMachine,
        signals: mpsc::UnboundedReceiver<FlowSignal>,
    }

    fn fixture_with(store: Arc<LocalIdentityStore>) -> Fixture {
        store.sign_in(Identity::new("user_1").with_display_name("Rohit"));
        let persistence = Arc::new(PersistenceClient::new(store.clone(), "user_1"));
        let (tx, rx) = mpsc::unbounded_channel();
        let machine =
            ProfileStepMachine::new(7, Some("Rohit".into()), persistence, DONE_DELAY, tx);
        Fixture {
            store,
            machine,
            signals: rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(LocalIdentityStore::new())
    }

    fn fill(machine: &ProfileStepMachine) {
        machine.proceed().unwrap();
        machine.select_team(Team::Australia).unwrap();
        machine.select_role(Role::Analyst).unwrap();
    }

    #[tokio::test]
    async fn starts_in_intro_with_empty_draft() {
        let f = fixture();
        let snap = f.machine.snapshot();
        assert_eq!(snap.step, StepState::Intro);
        assert_eq!(snap.draft, ProfileDraft::default());
        assert!(!snap.busy);
        assert!(!snap.can_save());
        assert!(f.machine.intro_greeting().contains("Rohit"));
    }

    #[tokio::test]
    async fn edits_refused_outside_form() {
        let f = fixture();
        assert!(f.machine.select_team(Team::India).is_err());
        assert!(matches!(
            f.machine.save().await,
            Err(StepError::InvalidAction { action: "save", .. })
        ));
        assert!(f.store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn save_enabled_iff_team_and_role() {
        let f = fixture();
        f.machine.proceed().unwrap();
        assert!(!f.machine.snapshot().can_save());

        f.machine.set_username("rohit_fan_11").unwrap();
        assert!(!f.machine.snapshot().can_save());

        f.machine.select_team(Team::India).unwrap();
        assert!(!f.machine.snapshot().can_save());
        assert_eq!(f.machine.save().await.unwrap(), SaveOutcome::NotReady);

        f.machine.select_role(Role::Fan).unwrap();
        assert!(f.machine.snapshot().can_save());

        f.machine.set_username("").unwrap();
        assert!(f.machine.snapshot().can_save());
        assert!(f.store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn skip_closes_without_write() {
        let mut f = fixture();
        f.machine.skip().unwrap();

        assert_eq!(
            f.signals.try_recv().unwrap(),
            FlowSignal {
                episode: 7,
                exit: FlowExit::Skipped
            }
        );
        assert!(f.machine.snapshot().closed);
        assert!(f.machine.proceed().is_err());
        assert!(f.machine.skip().is_err());
        assert!(f.store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn no_way_back_to_intro() {
        let f = fixture();
        f.machine.proceed().unwrap();
        assert!(f.machine.proceed().is_err());
        assert!(f.machine.skip().is_err());
        assert_eq!(f.machine.step(), StepState::Form);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_form_and_allows_retry() {
        let mut f = fixture();
        fill(&f.machine);
        f.store
            .fail_next_update(IdentityError::Transport("network down".into()))
            .await;

        let failure = match f.machine.save().await.unwrap() {
            SaveOutcome::Failed(failure) => failure,
            other => panic!("expected failure, got {other:?}"),
        };
        assert!(failure.reason.contains("network down"));

        let snap = f.machine.snapshot();
        assert_eq!(snap.step, StepState::Form);
        assert!(!snap.busy);
        assert_eq!(snap.last_failure.as_ref(), Some(&failure));
        assert!(snap.can_save());

        // Not retried on its own.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(f.store.calls().await.len(), 1);
        assert!(f.signals.try_recv().is_err());

        assert_eq!(f.machine.save().await.unwrap(), SaveOutcome::Saved);
        let snap = f.machine.snapshot();
        assert_eq!(snap.step, StepState::Done);
        assert!(snap.last_failure.is_none());
        assert_eq!(f.store.calls().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn done_signals_completion_after_display_delay() {
        let mut f = fixture();
        fill(&f.machine);
        assert_eq!(f.machine.save().await.unwrap(), SaveOutcome::Saved);
        assert!(f.machine.done_greeting().contains("Rohit"));

        tokio::time::sleep(Duration::from_millis(1799)).await;
        assert!(f.signals.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(f.signals.try_recv().unwrap().exit, FlowExit::Completed);
        assert!(f.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_machine_never_signals() {
        let mut f = fixture();
        fill(&f.machine);
        f.machine.save().await.unwrap();
        drop(f.machine);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(f.signals.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_saves_coalesce_into_one_write() {
        let f = fixture_with(LocalIdentityStore::with_latency(Duration::from_millis(250)));
        fill(&f.machine);

        let (first, second) = tokio::join!(f.machine.save(), f.machine.save());
        assert_eq!(first.unwrap(), SaveOutcome::Saved);
        assert_eq!(second.unwrap(), SaveOutcome::AlreadySaving);
        assert_eq!(f.store.calls().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_save_can_be_retried() {
        let f = fixture_with(LocalIdentityStore::with_latency(Duration::from_millis(250)));
        fill(&f.machine);

        let abandoned = tokio::time::timeout(Duration::from_millis(10), f.machine.save()).await;
        assert!(abandoned.is_err());

        let snap = f.machine.snapshot();
        assert!(!snap.busy);
        assert!(snap.can_save());
        assert_eq!(snap.step, StepState::Form);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.machine.save().await.unwrap(), SaveOutcome::Saved);
        let calls = f.store.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_step() {
        let f = fixture();
        let mut rx = f.machine.subscribe();
        let mut steps = vec![rx.borrow_and_update().step];

        f.machine.proceed().unwrap();
        assert!(rx.has_changed().unwrap());
        steps.push(rx.borrow_and_update().step);

        // Refused actions do not notify.
        assert!(f.machine.proceed().is_err());
        assert!(!rx.has_changed().unwrap());

        f.machine.select_team(Team::India).unwrap();
        f.machine.select_role(Role::Fan).unwrap();
        rx.borrow_and_update();

        assert_eq!(f.machine.save().await.unwrap(), SaveOutcome::Saved);
        assert!(rx.has_changed().unwrap());
        let done = rx.borrow_and_update().clone();
        steps.push(done.step);

        assert_eq!(steps, [StepState::Intro, StepState::Form, StepState::Done]);
        assert!(done.closed);
        assert!(!done.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_allowed_while_busy() {
        let f = fixture_with(LocalIdentityStore::with_latency(Duration::from_millis(250)));
        fill(&f.machine);

        let edit = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let busy = f.machine.snapshot().busy;
            f.machine.set_username("late_edit").unwrap();
            f.machine.select_role(Role::Fan).unwrap();
            busy
        };
        let (saved, was_busy) = tokio::join!(f.machine.save(), edit);

        assert!(was_busy);
        assert_eq!(saved.unwrap(), SaveOutcome::Saved);
        // The write used the draft as it was when save started.
        let calls = f.store.calls().await;
        assert_eq!(calls[0].update.metadata.role, Role::Analyst);
        assert!(calls[0].update.username.is_none());
    }
}
