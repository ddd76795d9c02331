//! OnboardingHost: owns the overlay's visibility and the flow instance behind it.
//!
//! The host runs as a single task that handles one event at a time: gate
//! triggers, exit signals from the flow, and the end of the fade-out. Each
//! opened flow gets a new episode number; signals carrying an older episode
//! are ignored.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OnboardingConfig;
use crate::identity::IdentityContext;

use super::gate::{TriggerSink, TriggerSource};
use super::machine::{FlowExit, FlowSignal, ProfileStepMachine};
use super::persistence::PersistenceClient;
use super::state::OnboardingVisibility;
use super::timer::ScheduledTask;

/// Emitted once per episode after the overlay is fully hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingFinished;

#[derive(Debug)]
enum HostEvent {
    Trigger(TriggerSource),
    FadeElapsed { episode: u64 },
}

/// Trigger sink that forwards into a host's event queue.
#[derive(Clone)]
pub struct HostTriggers {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl TriggerSink for HostTriggers {
    fn fire(&self, source: TriggerSource) {
        if self.events.send(HostEvent::Trigger(source)).is_err() {
            debug!(?source, "Onboarding host gone; trigger dropped");
        }
    }
}

/// Handle to a running host. Dropping it stops the host and every timer it owns.
pub struct OnboardingHost {
    events: mpsc::UnboundedSender<HostEvent>,
    visibility: watch::Receiver<OnboardingVisibility>,
    active: watch::Receiver<Option<Arc<ProfileStepMachine>>>,
    task: JoinHandle<()>,
}

impl OnboardingHost {
    /// Start a host. The returned receiver yields the "onboarding finished"
    /// notifications for the caller (the navigation header).
    pub fn spawn(
        config: OnboardingConfig,
        identity: IdentityContext,
    ) -> (Self, mpsc::UnboundedReceiver<OnboardingFinished>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (flow_tx, flow_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (visibility_tx, visibility_rx) = watch::channel(OnboardingVisibility::Hidden);
        let (active_tx, active_rx) = watch::channel(None);

        let host_loop = HostLoop {
            config,
            identity,
            visibility: visibility_tx,
            active: active_tx,
            episode: 0,
            fade: None,
            events: events_tx.clone(),
            flow_tx,
            finished: finished_tx,
        };
        let task = tokio::spawn(host_loop.run(events_rx, flow_rx));

        let host = Self {
            events: events_tx,
            visibility: visibility_rx,
            active: active_rx,
            task,
        };
        (host, finished_rx)
    }

    /// Sink to hand to an [`OnboardingGate`](super::gate::OnboardingGate).
    pub fn triggers(&self) -> HostTriggers {
        HostTriggers {
            events: self.events.clone(),
        }
    }

    /// Deliver a trigger directly.
    pub fn trigger(&self, source: TriggerSource) {
        self.triggers().fire(source);
    }

    pub fn visibility(&self) -> OnboardingVisibility {
        *self.visibility.borrow()
    }

    pub fn subscribe_visibility(&self) -> watch::Receiver<OnboardingVisibility> {
        self.visibility.clone()
    }

    /// The flow instance currently on screen, if any.
    pub fn active_flow(&self) -> Option<Arc<ProfileStepMachine>> {
        self.active.borrow().clone()
    }
}

impl Drop for OnboardingHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct HostLoop {
    config: OnboardingConfig,
    identity: IdentityContext,
    visibility: watch::Sender<OnboardingVisibility>,
    active: watch::Sender<Option<Arc<ProfileStepMachine>>>,
    episode: u64,
    fade: Option<ScheduledTask>,
    events: mpsc::UnboundedSender<HostEvent>,
    flow_tx: mpsc::UnboundedSender<FlowSignal>,
    finished: mpsc::UnboundedSender<OnboardingFinished>,
}

impl HostLoop {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<HostEvent>,
        mut flows: mpsc::UnboundedReceiver<FlowSignal>,
    ) {
        loop {
            tokio::select! {
                Some(event) = events.recv() => match event {
                    HostEvent::Trigger(source) => self.on_trigger(source),
                    HostEvent::FadeElapsed { episode } => self.on_fade_elapsed(episode),
                },
                Some(signal) = flows.recv() => self.on_flow_signal(signal),
                else => break,
            }
        }
    }

    fn current(&self) -> OnboardingVisibility {
        *self.visibility.borrow()
    }

    fn set_visibility(&self, target: OnboardingVisibility) {
        let from = self.current();
        if !from.can_transition_to(target) {
            warn!(%from, to = %target, "Unexpected visibility transition");
        }
        self.visibility.send_replace(target);
        debug!(episode = self.episode, visibility = %target, "Onboarding visibility changed");
    }

    fn on_trigger(&mut self, source: TriggerSource) {
        if self.current().is_on_screen() {
            debug!(?source, visibility = %self.current(), "Onboarding already on screen; trigger ignored");
            return;
        }

        let snapshot = self.identity.snapshot();
        let identity = match snapshot.identity {
            Some(identity) if snapshot.is_loaded && snapshot.is_signed_in => identity,
            _ => {
                warn!(?source, "Onboarding triggered without a signed-in identity; ignored");
                return;
            }
        };

        self.episode += 1;
        let persistence = Arc::new(PersistenceClient::new(
            self.identity.service(),
            identity.id.clone(),
        ));
        let machine = Arc::new(ProfileStepMachine::new(
            self.episode,
            identity.display_name.clone(),
            persistence,
            self.config.done_display_delay,
            self.flow_tx.clone(),
        ));

        info!(
            episode = self.episode,
            flow_id = %machine.id(),
            identity_id = %identity.id,
            ?source,
            "Opening onboarding"
        );
        self.active.send_replace(Some(machine));
        self.set_visibility(OnboardingVisibility::Visible);
    }

    fn on_flow_signal(&mut self, signal: FlowSignal) {
        if signal.episode != self.episode || self.current() != OnboardingVisibility::Visible {
            debug!(
                signal_episode = signal.episode,
                episode = self.episode,
                "Stale flow signal ignored"
            );
            return;
        }

        match signal.exit {
            FlowExit::Skipped => info!(episode = self.episode, "Onboarding dismissed"),
            FlowExit::Completed => info!(episode = self.episode, "Onboarding completed"),
        }

        self.set_visibility(OnboardingVisibility::Closing);
        let events = self.events.clone();
        let episode = self.episode;
        self.fade = Some(ScheduledTask::after(self.config.fade_out_delay, async move {
            let _ = events.send(HostEvent::FadeElapsed { episode });
        }));
    }

    fn on_fade_elapsed(&mut self, episode: u64) {
        if episode != self.episode || self.current() != OnboardingVisibility::Closing {
            debug!(fade_episode = episode, episode = self.episode, "Stale fade ignored");
            return;
        }

        self.fade = None;
        self.active.send_replace(None);
        self.set_visibility(OnboardingVisibility::Hidden);
        let _ = self.finished.send(OnboardingFinished);
        info!(episode, "Onboarding finished");
    }
}
