use chrono::Duration;

use super::entities::ActivityRecord;

/// Value used to bridge gaps between repeated observations of the same
/// window. There has to be a limit so that an activity from an hour ago
/// doesn't swallow new samples.
pub const LIMIT_TIME_APART: Duration = Duration::minutes(15);

/// Number of raw inserts between compaction runs of a day file.
pub const MERGING_BATCH_SIZE: usize = 50;

/// Collapses a time-ordered batch of records into one record per maximal
/// mergeable run.
///
/// Each incoming record is folded into the most recent accumulator entry
/// with matching identity fields that is still within [LIMIT_TIME_APART],
/// otherwise it opens a new entry. Running the merge over its own output is
/// a fixpoint, which is what makes periodic re-compaction of a day file
/// safe.
pub fn merge_records(records: impl IntoIterator<Item = ActivityRecord>) -> Vec<ActivityRecord> {
    let mut merged: Vec<ActivityRecord> = Vec::new();

    for record in records {
        let open_match = merged.iter_mut().rev().find(|existing| {
            record.timestamp_ms - existing.timestamp_ms <= LIMIT_TIME_APART.num_milliseconds()
                && existing.matches(&record)
        });

        match open_match {
            Some(existing) => existing.count += record.count,
            None => merged.push(record),
        }
    }

    merged
}
