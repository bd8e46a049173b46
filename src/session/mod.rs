// Per-user runtime context: one buffer, one poller state, one countdown.
// Sessions are created at login and discarded at logout by the SessionManager.

mod manager;

pub use manager::{SessionManager, SessionManagerConfig, SourceFactory};

use serde::Serialize;

use crate::buffer::TimeSeriesBuffer;
use crate::error::SessionError;
use crate::poller::{PollerState, RunOutcome, RunReport};

/// Result of the most recent run, kept for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub state: PollerState,
    pub fetches: u32,
    pub appended: usize,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub buffer: TimeSeriesBuffer,
    pub state: PollerState,
    pub remaining_seconds: f64,
    pub endpoint: Option<String>,
    pub last_run: Option<LastRun>,
}

/// Serializable view of a session for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub user_id: i64,
    pub state: PollerState,
    pub active: bool,
    pub remaining_seconds: f64,
    pub endpoint: Option<String>,
    pub rows: usize,
    pub last_run: Option<LastRun>,
}

impl Session {
    pub fn new(user_id: i64, buffer: TimeSeriesBuffer) -> Self {
        Self {
            user_id,
            buffer,
            state: PollerState::Idle,
            remaining_seconds: 0.0,
            endpoint: None,
            last_run: None,
        }
    }

    pub fn active(&self) -> bool {
        self.state == PollerState::Running
    }

    /// Idle -> Running. Rejects a second start while a run is active.
    pub fn begin_run(&mut self, duration_secs: f64, endpoint: &str) -> Result<(), SessionError> {
        if self.active() {
            return Err(SessionError::AlreadyRunning);
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SessionError::InvalidDuration(format!(
                "duration must be > 0 seconds, got {}",
                duration_secs
            )));
        }
        self.state = PollerState::Running;
        self.remaining_seconds = duration_secs;
        self.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    /// Records the terminal state of a run and returns to Idle.
    pub fn finish_run(&mut self, report: &RunReport) {
        let state = report.outcome.terminal_state();
        let error = match &report.outcome {
            RunOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        };
        tracing::debug!(user_id = self.user_id, ?state, "run terminal state recorded");
        self.last_run = Some(LastRun {
            state,
            fetches: report.fetches,
            appended: report.appended,
            error,
        });
        self.remaining_seconds = self.remaining_seconds.max(0.0);
        self.state = PollerState::Idle;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            user_id: self.user_id,
            state: self.state,
            active: self.active(),
            remaining_seconds: self.remaining_seconds,
            endpoint: self.endpoint.clone(),
            rows: self.buffer.len(),
            last_run: self.last_run.clone(),
        }
    }
}
