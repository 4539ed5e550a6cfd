//! Foreground idle supervision.
//!
//! Every line typed counts as activity. While the inactivity warning is up,
//! `continue` keeps the session and `logout` ends it at once.

use std::sync::Arc;

use anyhow::{Result, bail};
use session::{ActivitySignal, IdleEvent, IdleSupervisor, TokioClock, format_countdown};
use shared::config::Config;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::debug;

use super::session::connect;

pub async fn watch(config: &Config) -> Result<()> {
    let session = connect(config)?;
    if !session.check_auth_status().await.is_authenticated {
        bail!("no active session; run `storykeep login` first");
    }

    let supervisor =
        IdleSupervisor::spawn(session.clone(), &config.idle, Arc::new(TokioClock::new()));
    let mut events = supervisor.events();
    let mut auth = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Watching the session. Press Enter to register activity, `continue` to dismiss a warning, `logout` to sign out."
    );

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                match line.trim() {
                    "continue" => {
                        let state = supervisor.continue_session().await;
                        if !state.is_authenticated {
                            println!("The session could not be renewed.");
                            break;
                        }
                        println!("Session continued.");
                    }
                    "logout" => {
                        supervisor.logout_now().await;
                        println!("Signed out.");
                        break;
                    }
                    _ => {
                        if !supervisor.record_activity(ActivitySignal::KeyPress) {
                            println!("Type `continue` to stay signed in.");
                        }
                    }
                }
            }
            event = events.recv() => match event {
                Ok(IdleEvent::WarningShown { countdown_seconds, .. }) => println!(
                    "You will be signed out in {} due to inactivity. Type `continue` to stay signed in.",
                    format_countdown(countdown_seconds)
                ),
                Ok(IdleEvent::CountdownTick { countdown_seconds, .. }) => {
                    if countdown_seconds % 60 == 0 || countdown_seconds <= 10 {
                        println!("Signing out in {}", format_countdown(countdown_seconds));
                    }
                }
                Ok(IdleEvent::AutoLogout { cause, .. }) => {
                    auth.wait_for(|state| !state.is_authenticated && !state.loading)
                        .await
                        .ok();
                    println!("Signed out ({}).", cause.as_str());
                    break;
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "idle events dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    supervisor.stop();
    Ok(())
}
