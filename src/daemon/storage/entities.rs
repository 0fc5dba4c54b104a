use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::Serialize;

use crate::sampling::ForegroundSnapshot;

/// One observation of the foreground window, stamped with the session it was
/// taken during. Produced once per tracking tick and folded into
/// [ActivityRecord]s before anything touches the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySample {
    pub platform: Arc<str>,
    pub window_id: u32,
    pub title: Arc<str>,
    pub owner_path: Arc<str>,
    pub owner_process_id: u32,
    pub owner_name: Arc<str>,
    pub owner_bundle_id: Option<String>,
    pub url: Option<String>,
    pub timestamp_ms: i64,
    pub time_entry_id: Arc<str>,
}

impl ActivitySample {
    pub fn from_snapshot(
        snapshot: ForegroundSnapshot,
        moment: DateTime<Utc>,
        time_entry_id: Arc<str>,
    ) -> Self {
        Self {
            platform: snapshot.platform,
            window_id: snapshot.window_id,
            title: snapshot.title,
            owner_path: snapshot.owner_path,
            owner_process_id: snapshot.owner_process_id,
            owner_name: snapshot.owner_name,
            owner_bundle_id: snapshot.owner_bundle_id,
            url: snapshot.url,
            timestamp_ms: moment.timestamp_millis(),
            time_entry_id,
        }
    }
}

/// The struct used for storing data on the disk. The intention is to only
/// save aggregated records to reduce disk usage. It's better to store 1
/// activity record specifying that the user has been looking at x 60 times
/// instead of 60 records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub platform: Arc<str>,
    pub window_id: u32,
    pub title: Arc<str>,
    pub owner_path: Arc<str>,
    pub owner_process_id: u32,
    pub owner_bundle_id: Option<String>,
    pub owner_name: Arc<str>,
    pub url: Option<String>,
    pub timestamp_ms: i64,
    pub count: u32,
}

impl ActivityRecord {
    /// Two records can be aggregated when these identity fields agree. The
    /// timestamp distance check lives in the merge engine.
    pub fn matches(&self, other: &Self) -> bool {
        self.platform == other.platform
            && self.title == other.title
            && self.owner_path == other.owner_path
            && self.owner_name == other.owner_name
            && self.owner_bundle_id == other.owner_bundle_id
    }

    /// Seconds of activity this record stands for, derived from the polling
    /// period and the number of samples folded into it.
    pub fn duration_seconds(&self) -> u64 {
        self.count as u64 * crate::daemon::DEFAULT_TICK_INTERVAL.as_secs()
    }
}

impl From<ActivitySample> for ActivityRecord {
    fn from(sample: ActivitySample) -> Self {
        ActivityRecord {
            platform: sample.platform,
            window_id: sample.window_id,
            title: sample.title,
            owner_path: sample.owner_path,
            owner_process_id: sample.owner_process_id,
            owner_bundle_id: sample.owner_bundle_id,
            owner_name: sample.owner_name,
            url: sample.url,
            timestamp_ms: sample.timestamp_ms,
            count: 1,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_record(owner_name: &str, title: &str, timestamp_ms: i64) -> ActivityRecord {
    ActivityRecord {
        platform: "linux".into(),
        window_id: 7,
        title: title.into(),
        owner_path: format!("/usr/bin/{owner_name}").into(),
        owner_process_id: 4242,
        owner_bundle_id: None,
        owner_name: owner_name.into(),
        url: None,
        timestamp_ms,
        count: 1,
    }
}
