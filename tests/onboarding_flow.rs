//! End-to-end onboarding scenarios: identity store, gate, host and flow
//! wired together the way the binary wires them, on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use cricscore_onboarding::config::OnboardingConfig;
use cricscore_onboarding::error::IdentityError;
use cricscore_onboarding::identity::{Identity, LocalIdentityStore, metadata_keys};
use cricscore_onboarding::onboarding::{
    OnboardingFinished, OnboardingGate, OnboardingHost, OnboardingVisibility, Role, SaveOutcome,
    StepState, Team, reminder_visible,
};

struct Harness {
    store: Arc<LocalIdentityStore>,
    host: OnboardingHost,
    finished: mpsc::UnboundedReceiver<OnboardingFinished>,
    gate: Arc<OnboardingGate>,
    _watch: JoinHandle<()>,
}

fn harness() -> Harness {
    let config = OnboardingConfig::default();
    let store = LocalIdentityStore::new();
    let context = store.context();
    let (host, finished) = OnboardingHost::spawn(config.clone(), context.clone());
    let gate = Arc::new(OnboardingGate::new(config.trigger_delay, host.triggers()));
    let watch = Arc::clone(&gate).spawn_watch(context.subscribe());
    Harness {
        store,
        host,
        finished,
        gate,
        _watch: watch,
    }
}

fn fan(name: &str) -> Identity {
    Identity::new("user_42").with_display_name(name)
}

/// Count finished notifications received so far.
fn drain(finished: &mut mpsc::UnboundedReceiver<OnboardingFinished>) -> usize {
    let mut count = 0;
    while finished.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn incomplete_profile_is_completed_after_a_failed_save() {
    let mut h = harness();
    h.store.sign_in(fan("Ellyse"));

    sleep(Duration::from_millis(699)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);

    let flow = h.host.active_flow().expect("flow on screen");
    assert_eq!(flow.step(), StepState::Intro);
    assert!(flow.intro_greeting().contains("Ellyse"));

    flow.proceed().unwrap();
    flow.set_username("  ellyse_p  ").unwrap();
    flow.select_team(Team::Australia).unwrap();
    assert!(!flow.snapshot().can_save());
    flow.select_role(Role::Analyst).unwrap();
    assert!(flow.snapshot().can_save());

    h.store
        .fail_next_update(IdentityError::Rejected {
            status: 422,
            reason: "That username is taken".into(),
        })
        .await;
    match flow.save().await.unwrap() {
        SaveOutcome::Failed(failure) => assert!(failure.reason.contains("That username is taken")),
        other => panic!("expected failure, got {other:?}"),
    }
    let snapshot = flow.snapshot();
    assert_eq!(snapshot.step, StepState::Form);
    assert!(!snapshot.busy);
    assert!(snapshot.last_failure.is_some());
    assert!(!h.store.snapshot().profile_complete());
    settle().await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);

    assert_eq!(flow.save().await.unwrap(), SaveOutcome::Saved);
    assert_eq!(flow.step(), StepState::Done);
    assert!(flow.snapshot().last_failure.is_none());
    assert!(flow.done_greeting().contains("Ellyse"));

    let identity = h.store.snapshot().identity.unwrap();
    assert_eq!(identity.username.as_deref(), Some("ellyse_p"));
    assert_eq!(identity.metadata[metadata_keys::PROFILE_COMPLETE], json!(true));
    assert_eq!(identity.metadata[metadata_keys::FAVORITE_TEAM], json!("Australia"));
    assert_eq!(identity.metadata[metadata_keys::ROLE], json!("Analyst"));
    assert!(!reminder_visible(&h.store.snapshot()));

    let calls = h.store.calls().await;
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].succeeded);
    assert!(calls[1].succeeded);

    // Done stays up for the display delay, then the overlay fades out.
    sleep(Duration::from_millis(1799)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Closing);
    assert_eq!(drain(&mut h.finished), 0);

    sleep(Duration::from_millis(398)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Closing);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    assert!(h.host.active_flow().is_none());
    assert_eq!(drain(&mut h.finished), 1);

    // Completed profiles are never interrupted again.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    assert_eq!(drain(&mut h.finished), 0);
}

#[tokio::test(start_paused = true)]
async fn skipping_writes_nothing_and_the_reminder_reopens_the_flow() {
    let mut h = harness();
    h.store.sign_in(fan("Jemimah"));
    sleep(Duration::from_millis(701)).await;

    let first = h.host.active_flow().expect("flow on screen");
    first.skip().unwrap();
    settle().await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Closing);

    sleep(Duration::from_millis(400)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    assert_eq!(drain(&mut h.finished), 1);
    assert!(h.store.calls().await.is_empty());
    assert!(reminder_visible(&h.store.snapshot()));

    // The scheduled trigger does not come back on its own.
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);

    h.gate.request_now().await;
    settle().await;
    let second = h.host.active_flow().expect("reopened");
    assert_eq!(second.episode(), 2);
    assert_eq!(second.step(), StepState::Intro);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test(start_paused = true)]
async fn back_to_back_triggers_open_one_flow() {
    let h = harness();
    h.store.sign_in(fan("Harmanpreet"));
    settle().await;

    h.gate.request_now().await;
    h.gate.request_now().await;
    settle().await;
    let flow = h.host.active_flow().expect("flow on screen");
    assert_eq!(flow.episode(), 1);

    // The manual request replaced the scheduled one.
    sleep(Duration::from_secs(2)).await;
    let still = h.host.active_flow().expect("flow on screen");
    assert!(Arc::ptr_eq(&flow, &still));
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);
}

#[tokio::test(start_paused = true)]
async fn complete_profile_never_triggers() {
    let mut h = harness();
    h.store.sign_in(fan("Smriti").with_metadata(metadata_keys::PROFILE_COMPLETE, json!(true)));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    assert!(!h.gate.has_pending().await);
    assert!(!reminder_visible(&h.store.snapshot()));
    assert_eq!(drain(&mut h.finished), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_to_an_incomplete_account_opens_the_flow() {
    let h = harness();
    h.store.sign_in(
        Identity::new("user_7")
            .with_display_name("Mithali")
            .with_metadata(metadata_keys::PROFILE_COMPLETE, json!(true)),
    );
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);

    // Another account signs in without a signed-out snapshot in between.
    h.store.sign_in(fan("Jhulan"));
    sleep(Duration::from_millis(701)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);
    let flow = h.host.active_flow().expect("flow on screen");
    assert!(flow.intro_greeting().contains("Jhulan"));
}

#[tokio::test(start_paused = true)]
async fn signing_out_before_the_delay_cancels_the_trigger() {
    let h = harness();
    h.store.sign_in(fan("Deepti"));
    sleep(Duration::from_millis(300)).await;
    h.store.sign_out();

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);

    // A fresh sign-in is a fresh session with its own delay.
    h.store.sign_in(fan("Deepti"));
    sleep(Duration::from_millis(699)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Visible);
}

#[tokio::test(start_paused = true)]
async fn loading_session_waits_for_the_identity() {
    let h = harness();
    sleep(Duration::from_secs(2)).await;
    assert!(!h.gate.has_pending().await);
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);

    h.store.sign_in(fan("Renuka"));
    settle().await;
    assert!(h.gate.has_pending().await);
}

#[tokio::test(start_paused = true)]
async fn teardown_before_the_delay_fires_nothing() {
    let mut h = harness();
    h.store.sign_in(fan("Shafali"));
    sleep(Duration::from_millis(300)).await;
    assert!(h.gate.has_pending().await);

    h.gate.shutdown().await;
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.host.visibility(), OnboardingVisibility::Hidden);
    assert!(h.host.active_flow().is_none());
    assert_eq!(drain(&mut h.finished), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_host_ignores_gate_triggers() {
    let h = harness();
    let Harness {
        store,
        host,
        mut finished,
        gate,
        _watch,
    } = h;
    store.sign_in(fan("Richa"));
    settle().await;
    drop(host);

    sleep(Duration::from_secs(2)).await;
    assert!(!gate.has_pending().await);
    assert_eq!(drain(&mut finished), 0);
}
