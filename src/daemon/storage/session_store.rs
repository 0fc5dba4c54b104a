use std::{future::Future, path::PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{daemon::error::TrackError, fs::operations::replace_file_atomically};

/// A tracked period of work. Focus entries are subject to block-list
/// enforcement, break entries are exempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub item_ref: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    pub is_focus_mode: bool,
    /// Minutes the user intends to spend, when they set a goal.
    #[serde(default)]
    pub target_duration: Option<u32>,
    #[serde(default)]
    pub auto_stop_enabled: bool,
}

impl TimeEntry {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Seconds past the configured target. An entry without a target never
    /// overruns.
    pub fn exceeded_by(&self, now: DateTime<Utc>) -> Option<i64> {
        let target = self.target_duration?;
        let exceeded = (now - self.start_time).num_seconds() - target as i64 * 60;
        (exceeded > 0).then_some(exceeded)
    }
}

/// Interface for abstracting persistence of [TimeEntry] values. The CLI and
/// the daemon both go through this, so an entry started by hand is visible
/// to the tracking loop on its next tick.
pub trait SessionStore {
    fn create(&self, entry: TimeEntry) -> impl Future<Output = Result<TimeEntry>> + Send;

    /// Sets the end time of the entry with the given id.
    fn close(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
    ) -> impl Future<Output = Result<TimeEntry>> + Send;

    fn get_active(&self, user_id: &str) -> impl Future<Output = Result<Option<TimeEntry>>> + Send;

    fn get_last(&self, user_id: &str) -> impl Future<Output = Result<Option<TimeEntry>>> + Send;
}

/// Json-lines file with one entry per line, rewritten atomically on every
/// mutation. The file is small (entries are only ever appended or closed) so
/// whole-file rewrites are cheaper than being clever.
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<Vec<TimeEntry>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut entries = vec![];
        for line in contents.lines().filter(|v| !v.is_empty()) {
            match serde_json::from_str::<TimeEntry>(line) {
                Ok(v) => entries.push(v),
                Err(e) => {
                    // ignore illegal values. Might happen after shutdowns
                    warn!(
                        "During parsing in path {:?} found illegal json string {}: {e}",
                        self.path, line
                    )
                }
            }
        }
        Ok(entries)
    }

    async fn save(&self, entries: &[TimeEntry]) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }
        replace_file_atomically(&self.path, &buffer).await
    }
}

impl SessionStore for JsonSessionStore {
    async fn create(&self, entry: TimeEntry) -> Result<TimeEntry> {
        let mut entries = self.load().await?;
        entries.push(entry.clone());
        self.save(&entries).await?;
        Ok(entry)
    }

    async fn close(&self, id: &str, end_time: DateTime<Utc>) -> Result<TimeEntry> {
        let mut entries = self.load().await?;
        let Some(entry) = entries.iter_mut().find(|v| v.id == id) else {
            return Err(TrackError::NotFound { id: id.into() }.into());
        };
        entry.end_time = Some(end_time);
        let closed = entry.clone();
        self.save(&entries).await?;
        Ok(closed)
    }

    async fn get_active(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        let entries = self.load().await?;
        Ok(entries
            .into_iter()
            .find(|v| v.user_id == user_id && v.is_active()))
    }

    async fn get_last(&self, user_id: &str) -> Result<Option<TimeEntry>> {
        let entries = self.load().await?;
        Ok(entries
            .into_iter()
            .filter(|v| v.user_id == user_id)
            .max_by_key(|v| v.start_time))
    }
}

#[cfg(test)]
pub(crate) fn test_entry(id: &str, user_id: &str, start_time: DateTime<Utc>) -> TimeEntry {
    TimeEntry {
        id: id.into(),
        user_id: user_id.into(),
        item_ref: None,
        start_time,
        end_time: None,
        is_focus_mode: true,
        target_duration: None,
        auto_stop_enabled: false,
    }
}
