use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::daemon::{
    blocking::BlockVerdict,
    session::SessionTracker,
    storage::{entities::ActivityRecord, session_store::SessionStore, session_store::TimeEntry},
};

/// Minimum time between two blocking prompts shown to the user.
pub const NOTIFICATION_COOLDOWN: Duration = Duration::seconds(60);

/// Minimum time between two "nothing is being tracked" reminders.
pub const IDLE_NUDGE_COOLDOWN: Duration = Duration::minutes(5);

/// What the user picked on the blocking modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChoice {
    /// Get back to work; keep prompting after the cooldown.
    StayOnTask,
    /// The flagged window is actually work; stop prompting for this entry.
    PartOfWork,
    /// Convert the focus session into a timed break.
    TakeBreak,
    /// Modal closed without picking anything.
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChoice {
    OpenSettings,
    Cancel,
}

/// Everything the UI needs to render the blocking modal.
#[derive(Debug, Clone)]
pub struct BlockPrompt {
    pub title: String,
    pub detail: String,
    pub user_id: String,
    pub time_entry_id: String,
}

/// Contract for the UI collaborator that owns dialogs and OS notifications.
/// The daemon only decides *when* to surface something.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Presents the three-choice blocking modal and resolves once the user
    /// reacts. May take arbitrarily long.
    async fn block_prompt(&self, prompt: BlockPrompt) -> Result<BlockChoice>;

    /// Tells the user sampling needs an OS permission and asks what to do.
    async fn permission_prompt(&self) -> Result<PermissionChoice>;

    /// The active entry ran past its target duration.
    async fn overrun(&self, entry: TimeEntry, exceeded_seconds: i64) -> Result<()>;

    /// Nothing is being tracked right now.
    async fn idle_nudge(&self, user_id: String) -> Result<()>;
}

/// Headless [Notifier] used when no UI shell is attached; every decision is
/// logged and prompts resolve as dismissed/cancelled.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn block_prompt(&self, prompt: BlockPrompt) -> Result<BlockChoice> {
        warn!(
            "Blocked activity during focus: {} ({})",
            prompt.title, prompt.detail
        );
        Ok(BlockChoice::Dismissed)
    }

    async fn permission_prompt(&self) -> Result<PermissionChoice> {
        warn!(
            "Sampling needs an OS permission. Grant it in the system privacy \
             settings, then restart tracking."
        );
        Ok(PermissionChoice::Cancel)
    }

    async fn overrun(&self, entry: TimeEntry, exceeded_seconds: i64) -> Result<()> {
        info!(
            "Session {} exceeded its target by {exceeded_seconds}s",
            entry.id
        );
        Ok(())
    }

    async fn idle_nudge(&self, user_id: String) -> Result<()> {
        info!("No active session for {user_id}, nothing is being tracked");
        Ok(())
    }
}

struct PendingBlock {
    time_entry_id: String,
    user_id: String,
    receiver: oneshot::Receiver<BlockChoice>,
}

/// Decides when the user gets interrupted. Prompt state, the cooldown stamp
/// and the permission latch all live on this struct so that tests can run
/// several independent controllers; nothing here is global.
///
/// A modal is represented by a pending one-shot channel: the notifier runs
/// on a spawned task while the tracking loop keeps ticking, and the answer
/// is folded back into the session machine by [drain_pending] at the top of
/// a later tick. While the channel is pending no second modal can open.
///
/// [drain_pending]: NotificationController::drain_pending
pub struct NotificationController<N> {
    notifier: Arc<N>,
    pending_block: Option<PendingBlock>,
    pending_permission: Option<oneshot::Receiver<PermissionChoice>>,
    last_notification_time: Option<DateTime<Utc>>,
    muted_entry: Option<String>,
    permission_fault: bool,
    overrun_notified: Option<String>,
    last_idle_nudge: Option<DateTime<Utc>>,
}

impl<N: Notifier> NotificationController<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier: Arc::new(notifier),
            pending_block: None,
            pending_permission: None,
            last_notification_time: None,
            muted_entry: None,
            permission_fault: false,
            overrun_notified: None,
            last_idle_nudge: None,
        }
    }

    /// True while sampling is suspended waiting for the user to sort out an
    /// OS permission.
    pub fn permission_fault(&self) -> bool {
        self.permission_fault
    }

    /// Latches the permission fault and surfaces the prompt once. Repeated
    /// calls while latched are no-ops, polling a denied permission is
    /// wasted work.
    pub fn permission_denied(&mut self) {
        if self.permission_fault {
            return;
        }
        self.permission_fault = true;

        let notifier = Arc::clone(&self.notifier);
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let choice = notifier
                .permission_prompt()
                .await
                .unwrap_or(PermissionChoice::Cancel);
            let _ = sender.send(choice);
        });
        self.pending_permission = Some(receiver);
    }

    /// Folds any answered prompt back into the session machine. Runs at the
    /// top of every tick so outcomes apply on the scheduler's timeline, not
    /// on the modal task's.
    pub async fn drain_pending<S: SessionStore>(
        &mut self,
        sessions: &SessionTracker<S>,
    ) -> Result<()> {
        if let Some(receiver) = self.pending_permission.as_mut() {
            match receiver.try_recv() {
                Ok(PermissionChoice::OpenSettings) => {
                    self.pending_permission = None;
                    // The user went to grant the permission; sampling
                    // resumes and a new failure would latch again.
                    self.permission_fault = false;
                    info!("Permission prompt acknowledged, sampling resumes");
                }
                Ok(PermissionChoice::Cancel) | Err(TryRecvError::Closed) => {
                    self.pending_permission = None;
                }
                Err(TryRecvError::Empty) => {}
            }
        }

        if let Some(mut pending) = self.pending_block.take() {
            match pending.receiver.try_recv() {
                Ok(choice) => {
                    debug!("Applying block prompt choice {choice:?}");
                    self.apply_choice(choice, &pending, sessions).await?;
                }
                Err(TryRecvError::Closed) => debug!("Block prompt went away unanswered"),
                Err(TryRecvError::Empty) => self.pending_block = Some(pending),
            }
        }
        Ok(())
    }

    async fn apply_choice<S: SessionStore>(
        &mut self,
        choice: BlockChoice,
        pending: &PendingBlock,
        sessions: &SessionTracker<S>,
    ) -> Result<()> {
        match choice {
            BlockChoice::StayOnTask => self.muted_entry = None,
            BlockChoice::PartOfWork => self.muted_entry = Some(pending.time_entry_id.clone()),
            BlockChoice::TakeBreak => {
                sessions.take_break(&pending.user_id).await?;
            }
            BlockChoice::Dismissed => {}
        }
        Ok(())
    }

    /// Opens the blocking modal when every gate passes: something is
    /// actually blocked, no modal is open, prompts aren't muted for this
    /// entry, and the cooldown has elapsed.
    pub fn maybe_prompt(
        &mut self,
        entry: &TimeEntry,
        record: &ActivityRecord,
        verdict: BlockVerdict,
        now: DateTime<Utc>,
    ) {
        if !verdict.any() {
            return;
        }
        if self.pending_block.is_some() {
            return;
        }
        if self.muted_entry.as_deref() == Some(entry.id.as_str()) {
            return;
        }
        if let Some(last) = self.last_notification_time {
            if now - last < NOTIFICATION_COOLDOWN {
                return;
            }
        }

        self.last_notification_time = Some(now);
        let prompt = BlockPrompt {
            title: record.title.to_string(),
            detail: record.owner_path.to_string(),
            user_id: entry.user_id.clone(),
            time_entry_id: entry.id.clone(),
        };

        let notifier = Arc::clone(&self.notifier);
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let choice = notifier
                .block_prompt(prompt)
                .await
                .unwrap_or(BlockChoice::Dismissed);
            let _ = sender.send(choice);
        });
        self.pending_block = Some(PendingBlock {
            time_entry_id: entry.id.clone(),
            user_id: entry.user_id.clone(),
            receiver,
        });
    }

    /// One overrun notification per entry; a new active entry re-arms it.
    pub fn notify_overrun(&mut self, entry: &TimeEntry, exceeded_seconds: i64) {
        if self.overrun_notified.as_deref() == Some(entry.id.as_str()) {
            return;
        }
        self.overrun_notified = Some(entry.id.clone());

        let notifier = Arc::clone(&self.notifier);
        let entry = entry.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.overrun(entry, exceeded_seconds).await {
                warn!("Overrun notification failed {e:?}");
            }
        });
    }

    /// Reminds the user that nothing is tracked, at most once per
    /// [IDLE_NUDGE_COOLDOWN].
    pub fn nudge_idle(&mut self, user_id: &str, now: DateTime<Utc>) {
        if let Some(last) = self.last_idle_nudge {
            if now - last < IDLE_NUDGE_COOLDOWN {
                return;
            }
        }
        self.last_idle_nudge = Some(now);

        let notifier = Arc::clone(&self.notifier);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.idle_nudge(user_id).await {
                warn!("Idle nudge failed {e:?}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::{
            blocking::BlockVerdict,
            session::{SessionSpec, SessionTracker},
            storage::{
                entities::test_record,
                session_store::{JsonSessionStore, TimeEntry},
            },
        },
        utils::clock::DefaultClock,
    };

    use super::{BlockChoice, MockNotifier, NotificationController, PermissionChoice};

    const BLOCKED: BlockVerdict = BlockVerdict {
        is_blocked_app: true,
        is_blocked_domain: false,
    };

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 9, 0, 0).unwrap()
    }

    fn sessions(dir: &std::path::Path) -> SessionTracker<JsonSessionStore> {
        SessionTracker::new(
            JsonSessionStore::new(dir.join("sessions")),
            Box::new(DefaultClock),
        )
    }

    async fn settle() {
        // Let the spawned prompt task run and push its answer through the
        // one-shot channel.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    fn entry(id: &str) -> TimeEntry {
        crate::daemon::storage::session_store::test_entry(id, "user", t0())
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_back_to_back_prompts() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_block_prompt()
            .times(2)
            .returning(|_| Ok(BlockChoice::StayOnTask));
        let mut controller = NotificationController::new(notifier);

        let entry = entry("focus-1");
        let record = test_record("discord", "general", 0);

        controller.maybe_prompt(&entry, &record, BLOCKED, t0());
        settle().await;
        controller.drain_pending(&sessions).await?;

        // 30s later the cooldown still holds.
        controller.maybe_prompt(&entry, &record, BLOCKED, t0() + Duration::seconds(30));
        controller.drain_pending(&sessions).await?;

        // 90s after the first prompt it may fire again.
        controller.maybe_prompt(&entry, &record, BLOCKED, t0() + Duration::seconds(90));
        settle().await;
        controller.drain_pending(&sessions).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_only_one_modal_at_a_time() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_block_prompt()
            .times(1)
            .returning(|_| Ok(BlockChoice::StayOnTask));
        let mut controller = NotificationController::new(notifier);

        let entry = entry("focus-1");
        let record = test_record("discord", "general", 0);

        controller.maybe_prompt(&entry, &record, BLOCKED, t0());
        // Way past the cooldown, but the first modal has not been drained.
        controller.maybe_prompt(&entry, &record, BLOCKED, t0() + Duration::seconds(300));

        settle().await;
        controller.drain_pending(&sessions).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_part_of_work_mutes_the_entry() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_block_prompt()
            .times(2)
            .returning(|_| Ok(BlockChoice::PartOfWork));
        let mut controller = NotificationController::new(notifier);

        let entry = entry("focus-1");
        let record = test_record("discord", "general", 0);

        controller.maybe_prompt(&entry, &record, BLOCKED, t0());
        settle().await;
        controller.drain_pending(&sessions).await?;

        // Muted: far past the cooldown yet no prompt for the same entry.
        controller.maybe_prompt(&entry, &record, BLOCKED, t0() + Duration::minutes(10));
        controller.drain_pending(&sessions).await?;

        // A different entry is not muted.
        let next = crate::daemon::storage::session_store::test_entry("focus-2", "user", t0());
        controller.maybe_prompt(&next, &record, BLOCKED, t0() + Duration::minutes(20));
        settle().await;
        controller.drain_pending(&sessions).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_take_break_converts_the_session() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());
        let focus = sessions
            .start(
                "user",
                SessionSpec {
                    is_focus_mode: true,
                    ..Default::default()
                },
            )
            .await?;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_block_prompt()
            .times(1)
            .returning(|_| Ok(BlockChoice::TakeBreak));
        let mut controller = NotificationController::new(notifier);

        let record = test_record("discord", "general", 0);
        controller.maybe_prompt(&focus, &record, BLOCKED, t0());
        settle().await;
        controller.drain_pending(&sessions).await?;

        let active = sessions.active("user").await?.unwrap();
        assert!(!active.is_focus_mode);
        assert_eq!(active.target_duration, Some(15));
        assert_ne!(active.id, focus.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_unblocked_record_never_prompts() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier.expect_block_prompt().times(0);
        let mut controller = NotificationController::new(notifier);

        let entry = entry("focus-1");
        let record = test_record("nvim", "main.rs", 0);
        controller.maybe_prompt(&entry, &record, BlockVerdict::default(), t0());
        controller.drain_pending(&sessions).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_permission_latch_clears_on_acknowledgement() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_permission_prompt()
            .times(1)
            .returning(|| Ok(PermissionChoice::OpenSettings));
        let mut controller = NotificationController::new(notifier);

        controller.permission_denied();
        assert!(controller.permission_fault());
        // Latched: a second denial does not prompt again.
        controller.permission_denied();

        settle().await;
        controller.drain_pending(&sessions).await?;
        assert!(!controller.permission_fault());
        Ok(())
    }

    #[tokio::test]
    async fn test_permission_latch_survives_cancel() -> Result<()> {
        let dir = tempdir()?;
        let sessions = sessions(dir.path());

        let mut notifier = MockNotifier::new();
        notifier
            .expect_permission_prompt()
            .times(1)
            .returning(|| Ok(PermissionChoice::Cancel));
        let mut controller = NotificationController::new(notifier);

        controller.permission_denied();
        settle().await;
        controller.drain_pending(&sessions).await?;

        assert!(controller.permission_fault());
        Ok(())
    }

    #[tokio::test]
    async fn test_overrun_notifies_once_per_entry() -> Result<()> {
        let mut notifier = MockNotifier::new();
        notifier.expect_overrun().times(2).returning(|_, _| Ok(()));
        let mut controller = NotificationController::new(notifier);

        let first = entry("focus-1");
        controller.notify_overrun(&first, 30);
        controller.notify_overrun(&first, 31);
        controller.notify_overrun(&first, 32);

        // A new entry re-arms the notification.
        let second = entry("focus-2");
        controller.notify_overrun(&second, 5);

        settle().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_nudge_is_throttled() -> Result<()> {
        let mut notifier = MockNotifier::new();
        notifier.expect_idle_nudge().times(2).returning(|_| Ok(()));
        let mut controller = NotificationController::new(notifier);

        controller.nudge_idle("user", t0());
        controller.nudge_idle("user", t0() + Duration::minutes(1));
        controller.nudge_idle("user", t0() + Duration::minutes(6));

        settle().await;
        Ok(())
    }
}
