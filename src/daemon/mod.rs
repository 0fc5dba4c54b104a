use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use notify::{LogNotifier, NotificationController, Notifier};
use session::SessionTracker;
use storage::{activity_log::{ActivityLog, ActivityLogImpl}, session_store::{JsonSessionStore, SessionStore}};
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracker::TrackingModule;

use crate::{
    sampling::{GenericSampleSource, SampleSource},
    settings::SettingsStore,
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod blocking;
pub mod error;
pub mod notify;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod tracker;

/// Period between two tracking ticks. Record durations are derived from it.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let sampler = GenericSampleSource::new()?;
    let shutdown_token = CancellationToken::new();

    let module = create_tracking_module(
        dir,
        Box::new(sampler),
        LogNotifier,
        &shutdown_token,
        DefaultClock,
        DEFAULT_TICK_INTERVAL,
    )?;

    let handle = TrackerHandle::spawn(module, shutdown_token.clone());
    shutdown::detect_shutdown(shutdown_token).await;

    if let Err(e) = handle.join().await {
        error!("Tracking module got an error {:?}", e);
    }

    Ok(())
}

/// A spawned tracking loop with an outside stop switch.
pub struct TrackerHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<Result<()>>,
}

impl TrackerHandle {
    pub fn spawn<A, S, N>(module: TrackingModule<A, S, N>, token: CancellationToken) -> Self
    where
        A: ActivityLog + Send + Sync + 'static,
        S: SessionStore + Send + Sync + 'static,
        N: Notifier,
    {
        let join = tokio::spawn(module.run());
        Self { token, join }
    }

    /// Safe to call from anywhere, any number of times. An
    /// armed-but-not-started tick never runs after this.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn join(self) -> Result<()> {
        self.join.await?
    }
}

pub(crate) fn create_tracking_module<N: Notifier>(
    dir: PathBuf,
    sampler: Box<dyn SampleSource>,
    notifier: N,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
    tick_interval: Duration,
) -> Result<TrackingModule<ActivityLogImpl, JsonSessionStore, N>> {
    let log = ActivityLogImpl::new(dir.join("activities"))?;
    let store = JsonSessionStore::new(dir.join("sessions"));
    let sessions = SessionTracker::new(store, Box::new(clock.clone()));
    let controller = NotificationController::new(notifier);
    let settings = SettingsStore::new(&dir);

    Ok(TrackingModule::new(
        sampler,
        log,
        sessions,
        controller,
        settings,
        shutdown_token.clone(),
        tick_interval,
        Box::new(clock),
    ))
}

#[cfg(test)]
mod daemon_tests {
    use std::{fs, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            create_tracking_module,
            notify::MockNotifier,
            storage::{
                activity_log::{ActivityLog, ActivityLogImpl},
                session_store::{JsonSessionStore, SessionStore, TimeEntry},
            },
            TrackerHandle,
        },
        sampling::{ForegroundSnapshot, MockSampleSource},
        settings::SETTINGS_FILE,
        utils::{clock::Clock, logging::TEST_LOGGING, time::local_date_of_ms},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn test_snapshots() -> Vec<ForegroundSnapshot> {
        let snapshot = |owner: &str, title: &str| ForegroundSnapshot {
            platform: "linux".into(),
            window_id: 3,
            title: title.into(),
            owner_path: format!("/usr/bin/{owner}").into(),
            owner_process_id: 11,
            owner_name: owner.into(),
            owner_bundle_id: None,
            url: None,
        };
        vec![
            snapshot("test", "test"),
            snapshot("test", "test"),
            snapshot("test b", "test b"),
        ]
    }

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// Very simple smoke test to check if the application is working
    /// properly: mock sampler in, real stores out, a handful of real ticks
    /// in between.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;

        tokio::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"isBlockingOnFocusMode":true}"#,
        )
        .await?;

        let test_clock = TestClock {
            start_time: Utc.from_utc_datetime(&TEST_START_DATE),
            reference: Instant::now(),
        };

        JsonSessionStore::new(dir.path().join("sessions"))
            .create(TimeEntry {
                id: "focus-1".into(),
                user_id: "local".into(),
                item_ref: None,
                start_time: test_clock.time(),
                end_time: None,
                is_focus_mode: true,
                target_duration: None,
                auto_stop_enabled: false,
            })
            .await?;

        let mut sampler = MockSampleSource::new();
        let mut items = test_snapshots().into_iter().cycle();
        sampler
            .expect_sample()
            .returning(move |_| Ok(Some(items.next().unwrap())));

        let shutdown_token = CancellationToken::new();
        let module = create_tracking_module(
            dir.path().to_owned(),
            Box::new(sampler),
            MockNotifier::new(),
            &shutdown_token,
            test_clock.clone(),
            Duration::from_millis(200),
        )?;

        let handle = TrackerHandle::spawn(module, shutdown_token);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        handle.stop();
        handle.join().await?;

        let files = fs::read_dir(dir.path().join("activities"))?.collect::<Vec<_>>();
        assert_eq!(files.len(), 1);

        let storage = ActivityLogImpl::new(dir.path().join("activities"))?;
        let date = local_date_of_ms(test_clock.start_time.timestamp_millis());

        // Five to six ticks ran and every one of them landed in the log.
        let raw = storage.query_day(date).await?;
        let total = raw.iter().map(|v| v.count).sum::<u32>();
        assert!(total >= 4, "expected at least 4 samples, got {total}");

        // Compacting folds the run into one record per distinct window.
        storage.compact(date).await?;
        let merged = storage.query_day(date).await?;
        assert!(merged.len() <= 2, "expected merged records, got {merged:?}");
        assert_eq!(merged.iter().map(|v| v.count).sum::<u32>(), total);

        Ok(())
    }
}
