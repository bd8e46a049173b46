// Owns one Session per logged-in user and the background task of its current poll run.
// Start spawns the poller (like the background stats worker); stop signals it and waits
// for the run to reach Idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, broadcast, oneshot};
use tracing::{Instrument, info, warn};

use super::{Session, SessionStatus};
use crate::buffer::TimeSeriesBuffer;
use crate::error::{PollError, SessionError};
use crate::models::{AggregateSummary, Reading};
use crate::poller::{Poller, PollerConfig, RetryPolicy};
use crate::sensor_client::{HttpSensorClient, ReadingSource};
use crate::sinks::{BroadcastViewSink, PersistenceSink};

/// Builds the reading source for an endpoint (HTTP in production, fakes in tests).
pub type SourceFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ReadingSource>, PollError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_duration_secs: u64,
    pub retry: RetryPolicy,
    /// Rows loaded from storage to seed a new session buffer.
    pub history_seed_limit: u32,
    pub live_channel_capacity: usize,
}

struct RunControl {
    stop_tx: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct ControlSlot {
    run: Option<RunControl>,
    /// Set once the entry has left the map; no run may start after that.
    closed: bool,
}

struct SessionEntry {
    user_id: i64,
    session: Arc<Mutex<Session>>,
    control: Mutex<ControlSlot>,
    live_tx: broadcast::Sender<Reading>,
}

/// Sessions by token, plus the token of each logged-in user.
#[derive(Default)]
struct SessionTable {
    by_token: HashMap<String, Arc<SessionEntry>>,
    by_user: HashMap<i64, String>,
}

impl SessionTable {
    fn remove_token(&mut self, token: &str) -> Option<Arc<SessionEntry>> {
        let entry = self.by_token.remove(token)?;
        if self.by_user.get(&entry.user_id).is_some_and(|t| t == token) {
            self.by_user.remove(&entry.user_id);
        }
        Some(entry)
    }
}

pub struct SessionManager {
    sessions: RwLock<SessionTable>,
    store: Arc<dyn PersistenceSink>,
    source_factory: SourceFactory,
    config: SessionManagerConfig,
}

impl SessionManager {
    /// Manager whose runs poll sensor devices over HTTP.
    pub fn new(store: Arc<dyn PersistenceSink>, config: SessionManagerConfig) -> Self {
        let timeout = config.fetch_timeout;
        let factory: SourceFactory = Arc::new(
            move |endpoint: &str| -> Result<Arc<dyn ReadingSource>, PollError> {
                let client = HttpSensorClient::new(endpoint, timeout)?;
                Ok(Arc::new(client))
            },
        );
        Self::with_source_factory(store, config, factory)
    }

    pub fn with_source_factory(
        store: Arc<dyn PersistenceSink>,
        config: SessionManagerConfig,
        source_factory: SourceFactory,
    ) -> Self {
        Self {
            sessions: RwLock::new(SessionTable::default()),
            store,
            source_factory,
            config,
        }
    }

    /// Returns the token of the user's session, creating one seeded from stored history
    /// when the user has none. A user never holds more than one session.
    pub async fn open(&self, user_id: i64) -> Result<String, SessionError> {
        if let Some(token) = self.sessions.read().await.by_user.get(&user_id) {
            return Ok(token.clone());
        }
        let history = self
            .store
            .load_recent(user_id, self.config.history_seed_limit)
            .await?;
        let seeded = history.len();
        let buffer = TimeSeriesBuffer::seeded(history);
        let (live_tx, _) = broadcast::channel(self.config.live_channel_capacity.max(1));
        let entry = Arc::new(SessionEntry {
            user_id,
            session: Arc::new(Mutex::new(Session::new(user_id, buffer))),
            control: Mutex::new(ControlSlot::default()),
            live_tx,
        });

        let mut table = self.sessions.write().await;
        // A concurrent login may have won while history was loading.
        if let Some(token) = table.by_user.get(&user_id) {
            return Ok(token.clone());
        }
        let token = uuid::Uuid::new_v4().to_string();
        table.by_token.insert(token.clone(), entry);
        table.by_user.insert(user_id, token.clone());
        drop(table);
        info!(user_id, seeded_rows = seeded, "session opened");
        Ok(token)
    }

    /// Stops any active run and discards the session.
    pub async fn close(&self, token: &str) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove_token(token)
            .ok_or(SessionError::NotFound)?;
        discard_entry(&entry).await;
        info!(user_id = entry.user_id, "session closed");
        Ok(())
    }

    /// Discards whatever session `user_id` holds (account deletion). Returns false when
    /// the user had none.
    pub async fn close_user(&self, user_id: i64) -> bool {
        let entry = {
            let mut table = self.sessions.write().await;
            match table.by_user.remove(&user_id) {
                Some(token) => table.by_token.remove(&token),
                None => None,
            }
        };
        let Some(entry) = entry else {
            return false;
        };
        discard_entry(&entry).await;
        info!(user_id, "session closed");
        true
    }

    pub async fn user_id(&self, token: &str) -> Result<i64, SessionError> {
        Ok(self.entry(token).await?.user_id)
    }

    /// Number of open sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.by_token.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Idle -> Running: validates the request and spawns the poll task.
    pub async fn start(
        &self,
        token: &str,
        duration_secs: f64,
        endpoint: &str,
    ) -> Result<(), SessionError> {
        if duration_secs > self.config.max_duration_secs as f64 {
            return Err(SessionError::InvalidDuration(format!(
                "duration must be <= {} seconds, got {}",
                self.config.max_duration_secs, duration_secs
            )));
        }
        let entry = self.entry(token).await?;
        let source = (self.source_factory)(endpoint)?;

        let mut control = entry.control.lock().await;
        if control.closed {
            return Err(SessionError::NotFound);
        }
        let user_id = {
            let mut session = entry.session.lock().await;
            session.begin_run(duration_secs, endpoint)?;
            session.user_id
        };

        let poller = Poller::new(
            source,
            self.store.clone(),
            Arc::new(BroadcastViewSink::new(entry.live_tx.clone())),
            PollerConfig {
                tick_interval: self.config.tick_interval,
                retry: self.config.retry,
            },
        );
        let (stop_tx, stop_rx) = oneshot::channel();
        let session = entry.session.clone();
        let span = tracing::debug_span!("poll_run", user_id, endpoint = %endpoint);
        let handle = tokio::spawn(
            async move {
                let report = poller.run(&session, stop_rx).await;
                session.lock().await.finish_run(&report);
            }
            .instrument(span),
        );
        info!(user_id, duration_secs, endpoint, "poll run started");
        control.run = Some(RunControl { stop_tx, handle });
        Ok(())
    }

    /// Requests cancellation and waits until the run has returned to Idle.
    /// Returns false when no run was active.
    pub async fn stop(&self, token: &str) -> Result<bool, SessionError> {
        let entry = self.entry(token).await?;
        Ok(stop_entry(&entry).await)
    }

    /// Resets the buffer to the placeholder row. Stored history is untouched.
    pub async fn clear(&self, token: &str) -> Result<(), SessionError> {
        let entry = self.entry(token).await?;
        entry.session.lock().await.buffer.clear();
        Ok(())
    }

    pub async fn status(&self, token: &str) -> Result<SessionStatus, SessionError> {
        let entry = self.entry(token).await?;
        let status = entry.session.lock().await.status();
        Ok(status)
    }

    pub async fn snapshot(&self, token: &str) -> Result<Vec<Reading>, SessionError> {
        let entry = self.entry(token).await?;
        let rows = entry.session.lock().await.buffer.snapshot().to_vec();
        Ok(rows)
    }

    /// Rows after `cursor` plus the cursor to use next time.
    pub async fn rows_since(
        &self,
        token: &str,
        cursor: usize,
    ) -> Result<(Vec<Reading>, usize), SessionError> {
        let entry = self.entry(token).await?;
        let session = entry.session.lock().await;
        Ok((
            session.buffer.rows_since(cursor).to_vec(),
            session.buffer.cursor(),
        ))
    }

    pub async fn summary(&self, token: &str) -> Result<AggregateSummary, SessionError> {
        let entry = self.entry(token).await?;
        let session = entry.session.lock().await;
        Ok(crate::aggregate::summarize(session.buffer.snapshot()))
    }

    /// Live feed of readings appended by this session's runs.
    pub async fn subscribe(
        &self,
        token: &str,
    ) -> Result<broadcast::Receiver<Reading>, SessionError> {
        let entry = self.entry(token).await?;
        Ok(entry.live_tx.subscribe())
    }

    /// Closes every session (process shutdown).
    pub async fn shutdown(&self) {
        let entries: Vec<Arc<SessionEntry>> = {
            let mut table = self.sessions.write().await;
            table.by_user.clear();
            table.by_token.drain().map(|(_, e)| e).collect()
        };
        let n = entries.len();
        futures_util::future::join_all(entries.iter().map(|e| discard_entry(e))).await;
        info!(sessions = n, "session manager shut down");
    }

    async fn entry(&self, token: &str) -> Result<Arc<SessionEntry>, SessionError> {
        self.sessions
            .read()
            .await
            .by_token
            .get(token)
            .cloned()
            .ok_or(SessionError::NotFound)
    }
}

async fn stop_entry(entry: &SessionEntry) -> bool {
    let mut slot = entry.control.lock().await;
    stop_run(&mut slot).await
}

/// Stops the run of an entry already removed from the table and bars new ones.
async fn discard_entry(entry: &SessionEntry) {
    let mut slot = entry.control.lock().await;
    slot.closed = true;
    stop_run(&mut slot).await;
}

async fn stop_run(slot: &mut ControlSlot) -> bool {
    let Some(control) = slot.run.take() else {
        return false;
    };
    let was_running = !control.handle.is_finished();
    // The run may already have ended on its own; the send then has no receiver.
    let _ = control.stop_tx.send(());
    if let Err(e) = control.handle.await {
        warn!(error = %e, operation = "stop_run", "poll task panicked");
    }
    was_running
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::PersistenceError;

    struct NullStore;

    #[async_trait]
    impl PersistenceSink for NullStore {
        async fn append(&self, _user_id: i64, _reading: &Reading) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn load_recent(
            &self,
            _user_id: i64,
            _limit: u32,
        ) -> Result<Vec<Reading>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ReadingSource for CountingSource {
        async fn fetch(&self) -> Result<Reading, PollError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Reading::new(70.0, 36.6, 1.0, 98.0, chrono::Utc::now()))
        }
    }

    fn manager(source: Arc<CountingSource>) -> SessionManager {
        let factory: SourceFactory = Arc::new(
            move |_: &str| -> Result<Arc<dyn ReadingSource>, PollError> { Ok(source.clone()) },
        );
        SessionManager::with_source_factory(
            Arc::new(NullStore),
            SessionManagerConfig {
                tick_interval: Duration::from_millis(500),
                fetch_timeout: Duration::from_secs(1),
                max_duration_secs: 3600,
                retry: RetryPolicy::default(),
                history_seed_limit: 10,
                live_channel_capacity: 8,
            },
            factory,
        )
    }

    // A start that looked the entry up just before a close removed it must not spawn.
    #[tokio::test(start_paused = true)]
    async fn start_on_discarded_entry_is_refused() {
        let source = Arc::new(CountingSource::default());
        let mgr = manager(source.clone());
        let token = mgr.open(1).await.unwrap();
        let entry = mgr.entry(&token).await.unwrap();

        mgr.close(&token).await.unwrap();
        // Put the discarded entry back where the in-flight start would still see it.
        mgr.sessions
            .write()
            .await
            .by_token
            .insert(token.clone(), entry.clone());

        assert!(matches!(
            mgr.start(&token, 60.0, "device").await,
            Err(SessionError::NotFound)
        ));
        assert!(entry.control.lock().await.run.is_none());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn table_tracks_one_token_per_user() {
        let mgr = manager(Arc::new(CountingSource::default()));
        let a = mgr.open(1).await.unwrap();
        let b = mgr.open(2).await.unwrap();
        assert_eq!(mgr.open(1).await.unwrap(), a);

        mgr.close(&a).await.unwrap();
        let table = mgr.sessions.read().await;
        assert!(!table.by_user.contains_key(&1));
        assert_eq!(table.by_user.get(&2), Some(&b));
        assert_eq!(table.by_token.len(), 1);
    }
}
