use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{
    daemon::{
        blocking::evaluate,
        notify::{NotificationController, Notifier},
        session::SessionTracker,
        storage::{
            activity_log::ActivityLog,
            entities::{ActivityRecord, ActivitySample},
            session_store::SessionStore,
        },
    },
    sampling::{is_permission_denied, SampleSource},
    settings::SettingsStore,
    utils::clock::Clock,
};

/// The tick driver. Owns every collaborator the tracking control flow
/// touches and runs them strictly sequentially: a tick finishes (or fails)
/// before the next one is armed, so no two ticks ever interleave.
pub struct TrackingModule<A, S, N> {
    sampler: Box<dyn SampleSource>,
    log: A,
    sessions: SessionTracker<S>,
    controller: NotificationController<N>,
    settings: SettingsStore,
    shutdown: CancellationToken,
    tick_interval: Duration,
    clock: Box<dyn Clock>,
}

impl<A: ActivityLog, S: SessionStore, N: Notifier> TrackingModule<A, S, N> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sampler: Box<dyn SampleSource>,
        log: A,
        sessions: SessionTracker<S>,
        controller: NotificationController<N>,
        settings: SettingsStore,
        shutdown: CancellationToken,
        tick_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            sampler,
            log,
            sessions,
            controller,
            settings,
            shutdown,
            tick_interval,
            clock,
        }
    }

    /// Executes the tracking event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.clock.instant();
        loop {
            tick_point += self.tick_interval;

            let span = info_span!("Tracking tick");
            if let Err(e) = self.tick().instrument(span).await {
                error!("Encountered an error during tracking {:?}", e)
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop and
                // any armed-but-not-started tick with it.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(tick_point) => ()
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let settings = self.settings.current().await?;
        let now = self.clock.time();

        // Outcomes of prompts answered since the last tick feed back into
        // the session machine here, on the scheduler's timeline.
        self.controller.drain_pending(&self.sessions).await?;

        let Some(active) = self.sessions.active(&settings.user_id).await? else {
            self.controller.nudge_idle(&settings.user_id, now);
            return Ok(());
        };

        if let Some(exceeded) = active.exceeded_by(now) {
            self.controller.notify_overrun(&active, exceeded);
            if active.auto_stop_enabled {
                self.sessions.stop(&settings.user_id, &active.id).await?;
                return Ok(());
            }
        }

        if self.controller.permission_fault() {
            return Ok(());
        }
        if !settings.is_blocking_on_focus_mode {
            return Ok(());
        }

        let snapshot = match self.sampler.sample(settings.permissions()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No foreground window resolvable, skipping tick");
                return Ok(());
            }
            Err(e) => {
                if is_permission_denied(&e) {
                    self.controller.permission_denied();
                    return Ok(());
                }
                return Err(e);
            }
        };

        // Break time is neither recorded nor held against the block lists.
        if !active.is_focus_mode {
            return Ok(());
        }

        let sample = ActivitySample::from_snapshot(snapshot, now, active.id.as_str().into());
        let record = ActivityRecord::from(sample);

        if let Err(e) = self.log.insert(record.clone()).await {
            // Storage trouble must not take the session machinery down.
            error!("Failed to store activity record {e:?}");
        }

        let verdict = evaluate(&record, &settings.blocked_apps, &settings.blocked_domains);
        self.controller
            .maybe_prompt(&active, &record, verdict, now);

        Ok(())
    }
}
