// SessionManager: login seeding, start/stop/restart, status, live feed, logout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use vitals_dashboard::error::{PollError, SessionError};
use vitals_dashboard::poller::{PollerState, RetryPolicy};
use vitals_dashboard::sensor_client::ReadingSource;
use vitals_dashboard::session::{SessionManager, SessionManagerConfig, SourceFactory};

fn config() -> SessionManagerConfig {
    SessionManagerConfig {
        tick_interval: Duration::from_millis(500),
        fetch_timeout: Duration::from_secs(2),
        max_duration_secs: 3600,
        retry: RetryPolicy::default(),
        history_seed_limit: 3,
        live_channel_capacity: 16,
    }
}

fn manager(store: Arc<RecordingStore>, source: Arc<ScriptedSource>) -> SessionManager {
    let factory: SourceFactory = Arc::new(
        move |_endpoint: &str| -> Result<Arc<dyn ReadingSource>, PollError> { Ok(source.clone()) },
    );
    SessionManager::with_source_factory(store, config(), factory)
}

fn setup() -> (SessionManager, Arc<RecordingStore>, Arc<ScriptedSource>) {
    let events = event_log();
    let store = Arc::new(RecordingStore::new(events.clone()));
    let source = Arc::new(ScriptedSource::new(events));
    (manager(store.clone(), source.clone()), store, source)
}

#[tokio::test]
async fn open_seeds_buffer_from_recent_history() {
    let events = event_log();
    let history: Vec<_> = (1..=5).map(|hr| reading(hr as f64, 36.6, 1.0, 98.0)).collect();
    let store = Arc::new(RecordingStore::with_rows(events.clone(), 3, history));
    let mgr = manager(store, Arc::new(ScriptedSource::new(events)));

    let token = mgr.open(3).await.unwrap();
    let rows = mgr.snapshot(&token).await.unwrap();
    let hrs: Vec<f64> = rows.iter().map(|r| r.heart_rate).collect();
    assert_eq!(hrs, vec![3.0, 4.0, 5.0]);
    assert_eq!(mgr.user_id(&token).await.unwrap(), 3);
}

#[tokio::test]
async fn open_without_history_starts_with_placeholder() {
    let (mgr, _, _) = setup();
    let token = mgr.open(1).await.unwrap();
    let status = mgr.status(&token).await.unwrap();
    assert_eq!(status.rows, 1);
    assert_eq!(status.state, PollerState::Idle);
    assert!(!status.active);
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let (mgr, _, _) = setup();
    assert!(matches!(
        mgr.status("nope").await,
        Err(SessionError::NotFound)
    ));
}

#[tokio::test]
async fn invalid_durations_are_rejected() {
    let (mgr, _, _) = setup();
    let token = mgr.open(1).await.unwrap();
    for bad in [0.0, -1.0, f64::NAN, 7200.0] {
        assert!(matches!(
            mgr.start(&token, bad, "device").await,
            Err(SessionError::InvalidDuration(_))
        ));
    }
    assert_eq!(mgr.status(&token).await.unwrap().state, PollerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn second_start_while_running_is_rejected() {
    let (mgr, _, _) = setup();
    let token = mgr.open(1).await.unwrap();
    mgr.start(&token, 60.0, "device").await.unwrap();
    assert!(matches!(
        mgr.start(&token, 60.0, "device").await,
        Err(SessionError::AlreadyRunning)
    ));
    assert!(mgr.stop(&token).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn run_expires_and_session_returns_to_idle() {
    let (mgr, store, _) = setup();
    let token = mgr.open(1).await.unwrap();
    mgr.start(&token, 1.0, "device").await.unwrap();
    assert!(mgr.status(&token).await.unwrap().active);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = mgr.status(&token).await.unwrap();
    assert_eq!(status.state, PollerState::Idle);
    let last = status.last_run.unwrap();
    assert_eq!(last.state, PollerState::Expired);
    assert_eq!(last.appended, 2);
    assert!(last.error.is_none());
    assert_eq!(store.rows_for(1).len(), 2);
    assert!(!mgr.stop(&token).await.unwrap(), "nothing left to stop");
}

#[tokio::test(start_paused = true)]
async fn stop_and_restart_neither_duplicates_nor_drops() {
    let (mgr, store, _) = setup();
    let token = mgr.open(1).await.unwrap();

    mgr.start(&token, 60.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(mgr.stop(&token).await.unwrap());
    let status = mgr.status(&token).await.unwrap();
    assert_eq!(status.state, PollerState::Idle);
    assert_eq!(
        status.last_run.map(|l| l.state),
        Some(PollerState::Cancelled)
    );

    mgr.start(&token, 60.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(mgr.stop(&token).await.unwrap());

    let buffered: Vec<f64> = mgr.snapshot(&token).await.unwrap()[1..]
        .iter()
        .map(|r| r.heart_rate)
        .collect();
    let stored: Vec<f64> = store.rows_for(1).iter().map(|r| r.heart_rate).collect();
    assert_eq!(buffered, stored);
    let expected: Vec<f64> = (1..=stored.len()).map(|n| n as f64).collect();
    assert_eq!(stored, expected, "sequential, no gaps or repeats");
}

#[tokio::test(start_paused = true)]
async fn rows_since_returns_delta_and_next_cursor() {
    let (mgr, _, _) = setup();
    let token = mgr.open(1).await.unwrap();
    let (initial, cursor) = mgr.rows_since(&token, 0).await.unwrap();
    assert_eq!(initial.len(), 1);

    mgr.start(&token, 1.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let (delta, next) = mgr.rows_since(&token, cursor).await.unwrap();
    assert_eq!(delta.len(), 2);
    assert_eq!(next, cursor + 2);
    let (none, same) = mgr.rows_since(&token, next).await.unwrap();
    assert!(none.is_empty());
    assert_eq!(same, next);
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_new_readings() {
    let (mgr, _, _) = setup();
    let token = mgr.open(1).await.unwrap();
    let mut rx = mgr.subscribe(&token).await.unwrap();
    mgr.start(&token, 1.0, "device").await.unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.heart_rate, 1.0);
    assert_eq!(second.heart_rate, 2.0);
}

#[tokio::test(start_paused = true)]
async fn clear_resets_buffer_but_not_storage() {
    let (mgr, store, _) = setup();
    let token = mgr.open(1).await.unwrap();
    mgr.start(&token, 1.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    mgr.clear(&token).await.unwrap();
    let rows = mgr.snapshot(&token).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_placeholder());
    assert_eq!(store.rows_for(1).len(), 2);
    assert_eq!(mgr.summary(&token).await.unwrap().count, 1);
}

#[tokio::test(start_paused = true)]
async fn close_stops_run_and_forgets_session() {
    let (mgr, store, source) = setup();
    let token = mgr.open(1).await.unwrap();
    mgr.start(&token, 60.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    mgr.close(&token).await.unwrap();
    let fetched = source.fetch_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.fetch_count(), fetched, "no fetch after logout");
    assert_eq!(store.rows_for(1).len(), fetched);
    assert!(matches!(
        mgr.user_id(&token).await,
        Err(SessionError::NotFound)
    ));
}

#[tokio::test(start_paused = true)]
async fn sessions_of_different_users_are_independent() {
    let (mgr, store, _) = setup();
    let a = mgr.open(1).await.unwrap();
    let b = mgr.open(2).await.unwrap();
    mgr.start(&a, 1.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(mgr.snapshot(&a).await.unwrap().len(), 3);
    assert_eq!(mgr.snapshot(&b).await.unwrap().len(), 1);
    assert!(store.rows_for(2).is_empty());

    mgr.shutdown().await;
    assert!(matches!(mgr.status(&a).await, Err(SessionError::NotFound)));
}

#[tokio::test(start_paused = true)]
async fn second_login_shares_the_users_session() {
    let (mgr, store, source) = setup();
    let a = mgr.open(7).await.unwrap();
    let b = mgr.open(7).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(mgr.len().await, 1);

    mgr.start(&a, 60.0, "device").await.unwrap();
    assert!(matches!(
        mgr.start(&b, 60.0, "device").await,
        Err(SessionError::AlreadyRunning)
    ));
    tokio::time::sleep(Duration::from_millis(1200)).await;

    mgr.close(&a).await.unwrap();
    let fetched = source.fetch_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.fetch_count(), fetched, "no run outlives logout");
    assert_eq!(store.rows_for(7).len(), fetched);
    assert!(matches!(mgr.status(&b).await, Err(SessionError::NotFound)));
    assert!(mgr.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn close_user_stops_the_run_and_frees_the_login() {
    let (mgr, store, source) = setup();
    let token = mgr.open(7).await.unwrap();
    mgr.start(&token, 60.0, "device").await.unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert!(mgr.close_user(7).await);
    let stored = store.rows_for(7).len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.rows_for(7).len(), stored, "no insert after the user is closed");
    assert_eq!(source.fetch_count(), stored);
    assert!(!mgr.close_user(7).await);

    let again = mgr.open(7).await.unwrap();
    assert_ne!(again, token);
}
