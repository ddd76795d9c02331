use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use cricscore_onboarding::config::{IdentityApiConfig, OnboardingConfig};
use cricscore_onboarding::error::IdentityError;
use cricscore_onboarding::identity::{
    HttpIdentityService, Identity, IdentityContext, IdentityService, IdentitySnapshot,
    LocalIdentityStore,
};
use cricscore_onboarding::onboarding::{
    OnboardingGate, OnboardingHost, ProfileStepMachine, Role, SaveOutcome, StepState, Team,
    copy, reminder_visible,
};

const DEMO_USER_ID: &str = "user_demo";
const DEMO_DISPLAY_NAME: &str = "Smriti";

/// Where snapshots come from: the in-process store, or a fetched remote user.
enum Backend {
    Local(Arc<LocalIdentityStore>),
    Http {
        service: Arc<HttpIdentityService>,
        user_id: String,
        snapshots: watch::Sender<IdentitySnapshot>,
    },
}

impl Backend {
    async fn connect(api: Option<IdentityApiConfig>) -> anyhow::Result<(Self, IdentityContext)> {
        let Some(api) = api else {
            let store = LocalIdentityStore::new();
            store.sign_in(Identity::new(DEMO_USER_ID).with_display_name(DEMO_DISPLAY_NAME));
            let context = store.context();
            return Ok((Backend::Local(store), context));
        };

        let service = Arc::new(HttpIdentityService::new(&api)?);
        let identity = service
            .fetch(&api.user_id)
            .await
            .with_context(|| format!("loading user {}", api.user_id))?;
        let (tx, rx) = watch::channel(IdentitySnapshot::signed_in(identity));
        let context = IdentityContext::new(rx, Arc::clone(&service) as Arc<dyn IdentityService>);
        Ok((
            Backend::Http {
                service,
                user_id: api.user_id,
                snapshots: tx,
            },
            context,
        ))
    }

    /// Re-read the remote user so the gate sees the saved profile.
    async fn refresh(&self) {
        if let Backend::Http {
            service,
            user_id,
            snapshots,
        } = self
        {
            match service.fetch(user_id).await {
                Ok(identity) => {
                    snapshots.send_replace(IdentitySnapshot::signed_in(identity));
                }
                Err(e) => tracing::warn!(error = %e, "Failed to refresh identity"),
            }
        }
    }

    fn local(&self) -> Option<&Arc<LocalIdentityStore>> {
        match self {
            Backend::Local(store) => Some(store),
            Backend::Http { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OnboardingConfig::from_env()?;
    let api = IdentityApiConfig::from_env()?;

    eprintln!("🏏 {} onboarding v{}", copy::PRODUCT_NAME, env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Delays: trigger {}ms, done {}ms, fade {}ms",
        config.trigger_delay.as_millis(),
        config.done_display_delay.as_millis(),
        config.fade_out_delay.as_millis()
    );
    match api {
        Some(ref api) => eprintln!("   Identity: {} (user {})", api.base_url, api.user_id),
        None => eprintln!("   Identity: local store (user {DEMO_USER_ID})"),
    }
    eprintln!("   Type `help` for commands.\n");

    let (backend, identity) = Backend::connect(api).await?;
    let (host, mut finished) = OnboardingHost::spawn(config.clone(), identity.clone());
    let gate = Arc::new(OnboardingGate::new(config.trigger_delay, host.triggers()));
    let _gate_watch = Arc::clone(&gate).spawn_watch(identity.subscribe());

    let mut visibility = host.subscribe_visibility();
    tokio::spawn(async move {
        while visibility.changed().await.is_ok() {
            let current = *visibility.borrow_and_update();
            eprintln!("[overlay] {current}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(_) = finished.recv() => {
                eprintln!("[header] onboarding finished");
                backend.refresh().await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" || line == "/quit" {
                    break;
                }
                run_command(line, &backend, &identity, &gate, &host).await;
            }
        }
    }

    gate.shutdown().await;
    Ok(())
}

async fn run_command(
    line: &str,
    backend: &Backend,
    identity: &IdentityContext,
    gate: &OnboardingGate,
    host: &OnboardingHost,
) {
    let (command, arg) = line
        .split_once(char::is_whitespace)
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((line, ""));

    match command {
        "help" => print_help(),
        "status" => print_status(identity, host),
        "signin" | "signout" | "loading" | "fail" => {
            let Some(store) = backend.local() else {
                eprintln!("Session commands only work with the local store.");
                return;
            };
            match command {
                "signin" => {
                    let name = if arg.is_empty() { DEMO_DISPLAY_NAME } else { arg };
                    let previous = store.snapshot().identity;
                    let identity = previous
                        .unwrap_or_else(|| Identity::new(DEMO_USER_ID))
                        .with_display_name(name);
                    store.sign_in(identity);
                }
                "signout" => store.sign_out(),
                "loading" => store.set_loading(),
                _ => {
                    let reason = if arg.is_empty() { "simulated outage" } else { arg };
                    store
                        .fail_next_update(IdentityError::Transport(reason.to_string()))
                        .await;
                    eprintln!("Next save will fail: {reason}");
                }
            }
        }
        "remind" => {
            if reminder_visible(&identity.snapshot()) {
                gate.request_now().await;
            } else {
                eprintln!("Nothing to complete.");
            }
        }
        _ => {
            let Some(flow) = host.active_flow() else {
                eprintln!("Unknown command or no onboarding on screen. Type `help`.");
                return;
            };
            flow_command(command, arg, flow).await;
        }
    }
}

async fn flow_command(command: &str, arg: &str, flow: Arc<ProfileStepMachine>) {
    let result = match command {
        "proceed" => flow.proceed().map(|()| {
            eprintln!("{}\n{}", copy::FORM_TITLE, copy::FORM_SUBTITLE);
        }),
        "skip" => flow.skip(),
        "name" => flow.set_username(arg),
        "team" => match arg.parse::<Team>() {
            Ok(team) => flow.select_team(team),
            Err(e) => {
                eprintln!("{e}. Options: {}", labels(Team::ALL.iter()));
                return;
            }
        },
        "role" => match arg.parse::<Role>() {
            Ok(role) => flow.select_role(role),
            Err(e) => {
                eprintln!("{e}. Options: {}", labels(Role::ALL.iter()));
                return;
            }
        },
        "save" => {
            // Runs in the background so edits stay possible while it is in flight.
            tokio::spawn(async move {
                eprintln!("{}", copy::SAVING_LABEL);
                match flow.save().await {
                    Ok(SaveOutcome::Saved) => {
                        eprintln!("{}\n{}", copy::DONE_TITLE, flow.done_greeting())
                    }
                    Ok(SaveOutcome::Failed(failure)) => {
                        eprintln!("Save failed: {}. Try again.", failure.reason)
                    }
                    Ok(SaveOutcome::NotReady) => eprintln!("Pick a team and a role first."),
                    Ok(SaveOutcome::AlreadySaving) => eprintln!("Already saving."),
                    Err(e) => eprintln!("{e}"),
                }
            });
            return;
        }
        _ => {
            eprintln!("Unknown command. Type `help`.");
            return;
        }
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

fn labels<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

fn print_status(identity: &IdentityContext, host: &OnboardingHost) {
    let snapshot = identity.snapshot();
    let profile = snapshot.profile();
    eprintln!(
        "session: loaded={} signed_in={} profile_complete={}",
        snapshot.is_loaded, snapshot.is_signed_in, profile.profile_complete
    );
    if let Some(team) = profile.favorite_team {
        eprintln!("favourite team: {team}");
    }
    if let Some(role) = profile.role {
        eprintln!("role: {role}");
    }
    if reminder_visible(&snapshot) {
        eprintln!("header shows: {}", copy::REMINDER_LABEL);
    }
    eprintln!("overlay: {}", host.visibility());
    if let Some(flow) = host.active_flow() {
        let step = flow.snapshot();
        eprintln!(
            "step: {} (can save: {}, busy: {})",
            step.step,
            step.can_save(),
            step.busy
        );
        eprintln!(
            "draft: username={:?} team={} role={}",
            step.draft.username,
            step.draft.favorite_team.map(|t| t.label()).unwrap_or("-"),
            step.draft.role.map(|r| r.label()).unwrap_or("-")
        );
        if let Some(failure) = step.last_failure {
            eprintln!("last failure: {} at {}", failure.reason, failure.failed_at);
        }
        match step.step {
            StepState::Intro => eprintln!("{}\n{}", copy::INTRO_TITLE, flow.intro_greeting()),
            StepState::Form => eprintln!("{}\n{}", copy::FORM_TITLE, copy::FORM_SUBTITLE),
            StepState::Done => eprintln!("{}\n{}", copy::DONE_TITLE, flow.done_greeting()),
        }
    }
}

fn print_help() {
    eprintln!("Session (local store only):");
    eprintln!("  signin [name]   sign the demo user in");
    eprintln!("  signout         sign out");
    eprintln!("  loading         put the session back into the loading state");
    eprintln!("  fail [reason]   make the next save fail");
    eprintln!("Onboarding:");
    eprintln!("  remind          \"{}\" from the header", copy::REMINDER_LABEL);
    eprintln!("  proceed | skip  leave the intro screen");
    eprintln!("  name <text>     username (optional)");
    eprintln!("  team <team>     {}", labels(Team::ALL.iter()));
    eprintln!("  role <role>     {}", labels(Role::ALL.iter()));
    eprintln!("  save            {}", copy::SAVE_LABEL);
    eprintln!("  status | quit");
}
