use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{
    fs::operations::replace_file_atomically,
    utils::time::{date_to_record_name, local_date_of_ms},
};

use super::{
    entities::ActivityRecord,
    merge::{merge_records, MERGING_BATCH_SIZE},
};

/// Column layout of a day file. The order is part of the on-disk format and
/// must not change.
pub const CSV_HEADERS: [&str; 10] = [
    "platform",
    "id",
    "title",
    "ownerPath",
    "ownerProcessId",
    "ownerBundleId",
    "ownerName",
    "url",
    "timestamp",
    "count",
];

/// Interface for abstracting storage of activity records.
pub trait ActivityLog {
    /// Appends one record to the day file its timestamp falls on. Every
    /// [MERGING_BATCH_SIZE] inserts the file is re-compacted.
    fn insert(&mut self, record: ActivityRecord) -> impl Future<Output = Result<()>> + Send;

    /// Records for a day, newest first.
    fn query_day(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<ActivityRecord>>> + Send;

    /// Rewrites a day file with its merged record set. After this, no two
    /// records in the file can be aggregated any further.
    fn compact(&self, date: NaiveDate) -> impl Future<Output = Result<()>> + Send;

    /// Truncates one day (or every day when `date` is None) back to an empty
    /// log.
    fn clear(&self, date: Option<NaiveDate>) -> impl Future<Output = Result<()>> + Send;
}

/// The main realization of [ActivityLog]. One comma-separated file per local
/// calendar day, commas inside free-text fields are replaced with
/// semicolons on write (lossy on purpose, the format has no escaping).
pub struct ActivityLogImpl {
    activity_dir: PathBuf,
    pending_inserts: usize,
}

impl ActivityLogImpl {
    pub fn new(activity_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&activity_dir)?;

        Ok(Self {
            activity_dir,
            pending_inserts: 0,
        })
    }

    fn file_path(&self, date: NaiveDate) -> PathBuf {
        self.activity_dir
            .join(format!("{}.csv", date_to_record_name(date)))
    }

    /// Records in file order, which is append order and therefore ascending
    /// by timestamp.
    async fn read_day(&self, path: &Path) -> Result<Vec<ActivityRecord>> {
        async fn extract(path: &Path) -> Result<Vec<ActivityRecord>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut records = vec![];
            let mut header_seen = false;
            while let Ok(Some(line)) = lines.next_line().await {
                if !header_seen {
                    header_seen = true;
                    continue;
                }
                match decode_record(&line) {
                    Some(record) => records.push(record),
                    None => {
                        // Might happen after a shutdown cut a write short.
                        warn!("During parsing in path {:?} found illegal row {}", path, &line)
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(records)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }

    async fn append_record(&self, path: &Path, record: &ActivityRecord) -> Result<()> {
        let mut file = File::options()
            .append(true)
            .create(true)
            .read(true)
            .open(path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::append_with_file(&mut file, record).await;
        file.unlock_async().await?;
        result
    }

    async fn append_with_file(file: &mut File, record: &ActivityRecord) -> Result<()> {
        let mut buffer = String::new();
        if file.metadata().await?.len() == 0 {
            buffer.push_str(&CSV_HEADERS.join(","));
            buffer.push('\n');
        }
        buffer.push_str(&encode_record(record));
        buffer.push('\n');

        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rewrite_day(&self, path: &Path, records: &[ActivityRecord]) -> Result<()> {
        let mut contents = String::new();
        contents.push_str(&CSV_HEADERS.join(","));
        contents.push('\n');
        for record in records {
            contents.push_str(&encode_record(record));
            contents.push('\n');
        }
        replace_file_atomically(path, contents.as_bytes()).await
    }
}

impl ActivityLog for ActivityLogImpl {
    async fn insert(&mut self, record: ActivityRecord) -> Result<()> {
        let date = local_date_of_ms(record.timestamp_ms);
        self.append_record(&self.file_path(date), &record).await?;

        self.pending_inserts += 1;
        if self.pending_inserts >= MERGING_BATCH_SIZE {
            self.pending_inserts = 0;
            self.compact(date).await?;
        }
        Ok(())
    }

    async fn query_day(&self, date: NaiveDate) -> Result<Vec<ActivityRecord>> {
        let mut records = self.read_day(&self.file_path(date)).await?;
        records.sort_by_key(|v| std::cmp::Reverse(v.timestamp_ms));
        Ok(records)
    }

    async fn compact(&self, date: NaiveDate) -> Result<()> {
        let path = self.file_path(date);
        let records = self.read_day(&path).await?;
        let merged = merge_records(records);
        self.rewrite_day(&path, &merged).await
    }

    async fn clear(&self, date: Option<NaiveDate>) -> Result<()> {
        match date {
            Some(date) => {
                let path = self.file_path(date);
                if tokio::fs::try_exists(&path).await? {
                    self.rewrite_day(&path, &[]).await?;
                }
            }
            None => {
                let mut entries = tokio::fs::read_dir(&self.activity_dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().is_some_and(|v| v == "csv") {
                        self.rewrite_day(&path, &[]).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Embedded separators in free-text fields are replaced rather than escaped.
fn sanitize(field: &str) -> String {
    field.replace(',', ";")
}

fn encode_record(record: &ActivityRecord) -> String {
    [
        record.platform.to_string(),
        record.window_id.to_string(),
        sanitize(&record.title),
        sanitize(&record.owner_path),
        record.owner_process_id.to_string(),
        sanitize(record.owner_bundle_id.as_deref().unwrap_or_default()),
        sanitize(&record.owner_name),
        sanitize(record.url.as_deref().unwrap_or_default()),
        record.timestamp_ms.to_string(),
        record.count.to_string(),
    ]
    .join(",")
}

fn decode_record(line: &str) -> Option<ActivityRecord> {
    let fields = line.split(',').collect::<Vec<_>>();
    let [platform, window_id, title, owner_path, owner_process_id, owner_bundle_id, owner_name, url, timestamp, count] =
        fields.as_slice()
    else {
        return None;
    };

    let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

    Some(ActivityRecord {
        platform: (*platform).into(),
        window_id: window_id.parse().ok()?,
        title: title.trim_matches('"').into(),
        owner_path: owner_path.trim_matches('"').into(),
        owner_process_id: owner_process_id.parse().ok()?,
        owner_bundle_id: optional(owner_bundle_id),
        owner_name: owner_name.trim_matches('"').into(),
        url: optional(url),
        timestamp_ms: timestamp.parse().ok()?,
        count: count.parse().ok()?,
    })
}
