use anyhow::Result;
use uuid::Uuid;

use crate::{
    daemon::{
        error::TrackError,
        storage::session_store::{SessionStore, TimeEntry},
    },
    utils::clock::Clock,
};

/// Break entries created from a block prompt always run for this long.
pub const BREAK_TARGET_MINUTES: u32 = 15;

/// Parameters for starting a new tracked session.
#[derive(Debug, Clone, Default)]
pub struct SessionSpec {
    pub item_ref: Option<String>,
    pub is_focus_mode: bool,
    pub target_duration: Option<u32>,
    pub auto_stop_enabled: bool,
}

/// The session state machine. There is at most one active entry per user at
/// any time; this is enforced here by querying the store before every
/// transition, not by the store itself.
pub struct SessionTracker<S> {
    store: S,
    clock: Box<dyn Clock>,
}

impl<S: SessionStore> SessionTracker<S> {
    pub fn new(store: S, clock: Box<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn active(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        self.store.get_active(user_id).await
    }

    pub async fn last(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        self.store.get_last(user_id).await
    }

    /// Starts tracking. Fails with [TrackError::Conflict] while another
    /// entry is active.
    pub async fn start(&self, user_id: &str, spec: SessionSpec) -> Result<TimeEntry> {
        if let Some(active) = self.store.get_active(user_id).await? {
            return Err(TrackError::Conflict {
                active_id: active.id,
            }
            .into());
        }

        self.store
            .create(TimeEntry {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.into(),
                item_ref: spec.item_ref,
                start_time: self.clock.time(),
                end_time: None,
                is_focus_mode: spec.is_focus_mode,
                target_duration: spec.target_duration,
                auto_stop_enabled: spec.auto_stop_enabled,
            })
            .await
    }

    /// Stops the active entry. Fails with [TrackError::NotFound] when `id`
    /// is not the currently active entry.
    pub async fn stop(&self, user_id: &str, id: &str) -> Result<TimeEntry> {
        match self.store.get_active(user_id).await? {
            Some(active) if active.id == id => self.store.close(id, self.clock.time()).await,
            _ => Err(TrackError::NotFound { id: id.into() }.into()),
        }
    }

    /// Converts whatever is currently tracked into a break: the active entry
    /// is closed and a fresh break entry with a fixed target starts at the
    /// same moment. Does nothing when nothing is active.
    pub async fn take_break(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        let Some(active) = self.store.get_active(user_id).await? else {
            return Ok(None);
        };

        let now = self.clock.time();
        self.store.close(&active.id, now).await?;
        let entry = self
            .store
            .create(TimeEntry {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.into(),
                item_ref: None,
                start_time: now,
                end_time: None,
                is_focus_mode: false,
                target_duration: Some(BREAK_TARGET_MINUTES),
                auto_stop_enabled: false,
            })
            .await?;
        Ok(Some(entry))
    }
}
