use std::{fmt::Display, future, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::{stream, Stream, StreamExt};
use now::DateTimeNow;
use tracing::error;

use crate::{
    daemon::storage::{
        activity_log::{ActivityLog, ActivityLogImpl},
        entities::ActivityRecord,
    },
    utils::{dir::create_application_default_path, time::next_day_start},
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ActivityCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option extracts the whole day"
    )]
    treat_as_days: bool,
    #[arg(long, help = "Print records as json lines instead of a table")]
    json: bool,
}

#[derive(Debug, Parser)]
pub struct ClearCommand {
    #[arg(
        long,
        help = "Day to clear, e.g. \"yesterday\" or \"15/03/2025\". Clears every day when omitted"
    )]
    day: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk)]
    date_style: DateStyle,
}

/// Command to list stored activity records between two dates, newest first.
pub async fn process_activity_command(
    ActivityCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
        json,
    }: ActivityCommand,
) -> Result<()> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();

    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => return Err(parse_failure("start", e)),
        None => now.beginning_of_day(),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => return Err(parse_failure("end", e)),
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }

    let log = Arc::new(ActivityLogImpl::new(
        create_application_default_path()?.join("activities"),
    )?);

    let mut records = extract_between(log, start.with_timezone(&Utc), end.with_timezone(&Utc))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
    records.sort_by_key(|v| std::cmp::Reverse(v.timestamp_ms));

    for record in records {
        if json {
            println!("{}", serde_json::to_string(&record)?);
        } else {
            let time = Local
                .timestamp_millis_opt(record.timestamp_ms)
                .single()
                .map(|v| v.format("%x %H:%M:%S").to_string())
                .unwrap_or_else(|| record.timestamp_ms.to_string());
            println!(
                "{}\t{}\t{}\t{}",
                time,
                format_duration(Duration::seconds(record.duration_seconds() as i64)),
                record.owner_name,
                record.title
            );
        }
    }
    Ok(())
}

pub async fn process_clear_command(
    ClearCommand { day, date_style }: ClearCommand,
) -> Result<()> {
    let log = ActivityLogImpl::new(create_application_default_path()?.join("activities"))?;

    let date = match day {
        Some(day) => match parse_date_string(&day, Local::now(), date_style.into()) {
            Ok(v) => Some(v.with_timezone(&Local).date_naive()),
            Err(e) => return Err(parse_failure("day", e)),
        },
        None => None,
    };

    log.clear(date).await?;
    match date {
        Some(date) => println!("Cleared activity for {date}"),
        None => println!("Cleared all activity"),
    }
    Ok(())
}

fn parse_failure(field: &str, error: chrono_english::DateError) -> anyhow::Error {
    Args::command()
        .error(
            clap::error::ErrorKind::ValueValidation,
            format!("Failed to validate {field} date {error}"),
        )
        .into()
}

/// Extracts [ActivityRecord]s between 2 moments. To do it in an efficient
/// manner streams are used: day files are read a few at a time instead of
/// loading the whole range up front.
pub fn extract_between<L>(
    log: Arc<L>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Stream<Item = Result<ActivityRecord>>
where
    L: ActivityLog + Send + Sync + 'static,
{
    let start_ms = start.timestamp_millis();
    let end_ms = end.timestamp_millis();

    let date_iteration = date_range(
        start.with_timezone(&Local).date_naive(),
        end.with_timezone(&Local).date_naive(),
    );

    let files = date_iteration
        .map(move |day| {
            let log = log.clone();
            async move { (day, log.query_day(day).await) }
        })
        .buffered(4);

    files
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter_map(move |v| {
            future::ready(
                v.map(|record| {
                    ((start_ms..=end_ms).contains(&record.timestamp_ms)).then_some(record)
                })
                .transpose(),
            )
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(mut current, end)| {
        future::ready({
            if current <= end {
                let last_current = current;
                current = current.succ_opt().expect("End of time should never happen");
                Some((last_current, (current, end)))
            } else {
                None
            }
        })
    })
}

fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio_stream::StreamExt;

    use crate::daemon::storage::{
        activity_log::{ActivityLog, ActivityLogImpl},
        entities::test_record,
    };

    use super::{date_range, extract_between, format_duration};

    #[tokio::test]
    async fn test_date_range_is_inclusive() -> Result<()> {
        let start = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        let end = NaiveDate::from_ymd_opt(2018, 7, 6).unwrap();

        let days = date_range(start, end).collect::<Vec<_>>().await;

        assert_eq!(days.len(), 3);
        assert_eq!(days[0], start);
        assert_eq!(days[2], end);
        Ok(())
    }

    #[tokio::test]
    async fn test_date_range_single_day() -> Result<()> {
        let day = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        let days = date_range(day, day).collect::<Vec<_>>().await;
        assert_eq!(days, vec![day]);
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_between_filters_by_moment() -> Result<()> {
        let dir = tempdir()?;
        let mut log = ActivityLogImpl::new(dir.path().to_owned())?;

        let base = Utc.with_ymd_and_hms(2018, 7, 4, 6, 0, 0).unwrap();
        log.insert(test_record("nvim", "early", base.timestamp_millis()))
            .await?;
        log.insert(test_record(
            "nvim",
            "late",
            (base + Duration::hours(4)).timestamp_millis(),
        ))
        .await?;

        let records = extract_between(
            Arc::new(log),
            base - Duration::hours(1),
            base + Duration::hours(1),
        )
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title.as_ref(), "early");
        Ok(())
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(90)), "1m30s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h2m3s");
    }
}
