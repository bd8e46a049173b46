// Shared test helpers: fake sensor source, recording sinks, temp databases.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use vitals_dashboard::accounts::AccountRepo;
use vitals_dashboard::error::{PersistenceError, PollError};
use vitals_dashboard::history_repo::HistoryRepo;
use vitals_dashboard::models::Reading;
use vitals_dashboard::sensor_client::ReadingSource;
use vitals_dashboard::sinks::{PersistenceSink, ViewSink};

pub fn reading(heart_rate: f64, temperature: f64, ecg: f64, spo2: f64) -> Reading {
    Reading::new(heart_rate, temperature, ecg, spo2, Utc::now())
}

pub fn reading_at(heart_rate: f64, timestamp: DateTime<Utc>) -> Reading {
    Reading::new(heart_rate, 36.6, 1.0, 98.0, timestamp)
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// What the fakes saw, in order, identified by heart rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Fetched(f64),
    Persisted(f64),
    Viewed(f64),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Replays scripted results, then yields readings with heart rate 1, 2, 3, ... forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Reading, PollError>>>,
    next_hr: Mutex<f64>,
    events: EventLog,
}

impl ScriptedSource {
    pub fn new(events: EventLog) -> Self {
        Self::with_script(events, Vec::new())
    }

    pub fn with_script(events: EventLog, script: Vec<Result<Reading, PollError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            next_hr: Mutex::new(1.0),
            events,
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Fetched(_)))
            .count()
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    async fn fetch(&self) -> Result<Reading, PollError> {
        let scripted = self.script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(r) => r,
            None => {
                let mut hr = self.next_hr.lock().unwrap();
                let r = reading(*hr, 36.6, 1.0, 98.0);
                *hr += 1.0;
                Ok(r)
            }
        };
        let hr = result.as_ref().map(|r| r.heart_rate).unwrap_or(f64::NAN);
        self.events.lock().unwrap().push(Event::Fetched(hr));
        result
    }
}

/// In-memory PersistenceSink. `fail_on` makes the n-th append (1-based) fail.
pub struct RecordingStore {
    rows: Mutex<Vec<(i64, Reading)>>,
    events: EventLog,
    fail_on: Option<usize>,
    appends: Mutex<usize>,
}

impl RecordingStore {
    pub fn new(events: EventLog) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            events,
            fail_on: None,
            appends: Mutex::new(0),
        }
    }

    pub fn failing_on(events: EventLog, n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::new(events)
        }
    }

    pub fn with_rows(events: EventLog, user_id: i64, rows: Vec<Reading>) -> Self {
        let store = Self::new(events);
        store
            .rows
            .lock()
            .unwrap()
            .extend(rows.into_iter().map(|r| (user_id, r)));
        store
    }

    pub fn rows_for(&self, user_id: i64) -> Vec<Reading> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for RecordingStore {
    async fn append(&self, user_id: i64, reading: &Reading) -> Result<(), PersistenceError> {
        let n = {
            let mut appends = self.appends.lock().unwrap();
            *appends += 1;
            *appends
        };
        if self.fail_on == Some(n) {
            return Err(PersistenceError("disk full".into()));
        }
        self.rows.lock().unwrap().push((user_id, *reading));
        self.events
            .lock()
            .unwrap()
            .push(Event::Persisted(reading.heart_rate));
        Ok(())
    }

    async fn load_recent(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Reading>, PersistenceError> {
        let rows = self.rows_for(user_id);
        let skip = rows.len().saturating_sub(limit as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }
}

pub struct RecordingView {
    events: EventLog,
}

impl RecordingView {
    pub fn new(events: EventLog) -> Self {
        Self { events }
    }
}

impl ViewSink for RecordingView {
    fn on_rows_added(&self, rows: &[Reading]) {
        let mut events = self.events.lock().unwrap();
        events.extend(rows.iter().map(|r| Event::Viewed(r.heart_rate)));
    }
}

/// Fresh SQLite database with both tables created. Keep the TempDir alive for the test.
pub async fn temp_repos() -> (TempDir, Arc<HistoryRepo>, Arc<AccountRepo>) {
    temp_repos_with_admins(Vec::new()).await
}

pub async fn temp_repos_with_admins(
    admins: Vec<String>,
) -> (TempDir, Arc<HistoryRepo>, Arc<AccountRepo>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vitals.db");
    let history = HistoryRepo::connect(
        path.to_str().unwrap(),
        2,
        std::time::Duration::from_secs(5),
    )
    .await
    .unwrap();
    history.init().await.unwrap();
    let accounts = AccountRepo::new(history.pool(), admins);
    accounts.init().await.unwrap();
    (dir, Arc::new(history), Arc::new(accounts))
}
