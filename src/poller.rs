// Time-boxed polling loop: Idle -> Running -> (Expired | Cancelled) -> Idle.
// One fetch per tick; each reading is persisted, then appended to the session buffer, then
// announced to the view sink. Stop is only observed between ticks.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::PollError;
use crate::models::Reading;
use crate::sensor_client::ReadingSource;
use crate::session::Session;
use crate::sinks::{PersistenceSink, ViewSink};

/// Float slack when comparing the countdown against zero.
const REMAINING_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    Idle,
    Running,
    Expired,
    Cancelled,
}

/// How many consecutive fetch failures a run tolerates before cancelling.
/// The default (0) cancels on the first failure. Persistence failures are always fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub tick_interval: Duration,
    pub retry: RetryPolicy,
}

/// Why a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Countdown reached zero.
    Expired,
    /// Stop requested (or the stop handle was dropped).
    Stopped,
    Failed(PollError),
}

impl RunOutcome {
    pub fn terminal_state(&self) -> PollerState {
        match self {
            RunOutcome::Expired => PollerState::Expired,
            RunOutcome::Stopped | RunOutcome::Failed(_) => PollerState::Cancelled,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Fetch attempts made, successful or not.
    pub fetches: u32,
    /// Readings appended to the buffer during this run.
    pub appended: usize,
}

pub struct Poller {
    source: Arc<dyn ReadingSource>,
    persistence: Arc<dyn PersistenceSink>,
    view: Arc<dyn ViewSink>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        persistence: Arc<dyn PersistenceSink>,
        view: Arc<dyn ViewSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            persistence,
            view,
            config,
        }
    }

    /// Drives one Running phase of `session` to completion.
    ///
    /// The session must already be in `Running` (see [`Session::begin_run`]); the caller
    /// records the report with [`Session::finish_run`]. The session lock is held only for
    /// the append and the countdown update, never across the network call.
    pub async fn run(
        &self,
        session: &Mutex<Session>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> RunReport {
        let tick = self.config.tick_interval;
        let tick_secs = tick.as_secs_f64();
        let user_id = session.lock().await.user_id;

        let mut fetches: u32 = 0;
        let mut appended: usize = 0;
        let mut consecutive_failures: u32 = 0;

        let outcome = loop {
            if stop_requested(&mut stop_rx) {
                break RunOutcome::Stopped;
            }

            fetches += 1;
            match self.ingest_one(user_id).await {
                Ok(reading) => {
                    consecutive_failures = 0;
                    session.lock().await.buffer.append(reading);
                    self.view.on_rows_added(std::slice::from_ref(&reading));
                    appended += 1;
                }
                Err(e)
                    if e.is_fetch_error()
                        && consecutive_failures < self.config.retry.max_consecutive_failures =>
                {
                    consecutive_failures += 1;
                    warn!(
                        error = %e,
                        operation = "fetch_reading",
                        consecutive_failures,
                        "fetch failed, skipping tick"
                    );
                }
                Err(e) => {
                    warn!(error = %e, operation = "poll_tick", "run cancelled by error");
                    break RunOutcome::Failed(e);
                }
            }

            let remaining = {
                let mut s = session.lock().await;
                s.remaining_seconds -= tick_secs;
                s.remaining_seconds
            };
            if remaining <= REMAINING_EPSILON {
                break RunOutcome::Expired;
            }

            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = &mut stop_rx => break RunOutcome::Stopped,
            }
        };

        info!(
            user_id,
            state = ?outcome.terminal_state(),
            fetches,
            appended,
            "poll run finished"
        );
        RunReport {
            outcome,
            fetches,
            appended,
        }
    }

    /// Fetch then write-through. The reading is returned only once it is durable.
    async fn ingest_one(&self, user_id: i64) -> Result<Reading, PollError> {
        let reading = self.source.fetch().await?;
        self.persistence.append(user_id, &reading).await?;
        debug!(
            heart_rate = reading.heart_rate,
            temperature = reading.temperature,
            ecg = reading.ecg,
            spo2 = reading.spo2,
            "reading ingested"
        );
        Ok(reading)
    }
}

/// Non-blocking check of the stop signal. A dropped sender counts as a stop.
fn stop_requested(stop_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(
        stop_rx.try_recv(),
        Err(oneshot::error::TryRecvError::Empty)
    )
}
