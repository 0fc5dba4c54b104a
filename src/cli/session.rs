use anyhow::{bail, Result};
use chrono::{Local, Utc};
use clap::Subcommand;

use crate::{
    daemon::{
        session::{SessionSpec, SessionTracker},
        storage::session_store::{JsonSessionStore, TimeEntry},
    },
    settings::SettingsStore,
    utils::{clock::DefaultClock, dir::create_application_default_path},
};

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    #[command(about = "Start tracking a focus session (or a break with --break)")]
    Start {
        #[arg(long, help = "Task or item this session is for")]
        item: Option<String>,
        #[arg(long = "break", help = "Start a break instead of a focus session")]
        break_mode: bool,
        #[arg(long, help = "Target duration in minutes")]
        target: Option<u32>,
        #[arg(
            long = "auto-stop",
            help = "Stop the session automatically once the target is exceeded"
        )]
        auto_stop: bool,
    },
    #[command(about = "Stop the active session")]
    Stop {},
    #[command(about = "Show the active (or most recent) session")]
    Status {},
}

pub async fn process_session_command(command: SessionCommand) -> Result<()> {
    let dir = create_application_default_path()?;
    let settings = SettingsStore::new(&dir).current().await?;
    let tracker = SessionTracker::new(
        JsonSessionStore::new(dir.join("sessions")),
        Box::new(DefaultClock),
    );

    match command {
        SessionCommand::Start {
            item,
            break_mode,
            target,
            auto_stop,
        } => {
            let entry = tracker
                .start(
                    &settings.user_id,
                    SessionSpec {
                        item_ref: item,
                        is_focus_mode: !break_mode,
                        target_duration: target,
                        auto_stop_enabled: auto_stop,
                    },
                )
                .await?;
            println!("Started {} session {}", kind(&entry), entry.id);
            Ok(())
        }
        SessionCommand::Stop {} => {
            let Some(active) = tracker.active(&settings.user_id).await? else {
                bail!("No active session to stop");
            };
            let entry = tracker.stop(&settings.user_id, &active.id).await?;
            println!(
                "Stopped {} session {} after {}m",
                kind(&entry),
                entry.id,
                (entry.end_time.unwrap_or_else(Utc::now) - entry.start_time).num_minutes()
            );
            Ok(())
        }
        SessionCommand::Status {} => {
            if let Some(active) = tracker.active(&settings.user_id).await? {
                let elapsed = (Utc::now() - active.start_time).num_minutes();
                let target = active
                    .target_duration
                    .map(|v| format!(" of {v}m"))
                    .unwrap_or_default();
                println!(
                    "Active {} session {} since {} ({elapsed}m{target})",
                    kind(&active),
                    active.id,
                    active.start_time.with_timezone(&Local).format("%x %H:%M")
                );
            } else if let Some(last) = tracker.last(&settings.user_id).await? {
                println!(
                    "No active session. Last {} session ended {}",
                    kind(&last),
                    last.end_time
                        .map(|v| v.with_timezone(&Local).format("%x %H:%M").to_string())
                        .unwrap_or_else(|| "-".into())
                );
            } else {
                println!("No sessions yet");
            }
            Ok(())
        }
    }
}

fn kind(entry: &TimeEntry) -> &'static str {
    if entry.is_focus_mode {
        "focus"
    } else {
        "break"
    }
}
