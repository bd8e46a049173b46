// WebSocket live stream of a session's new readings.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use super::error::ApiError;
use crate::models::Reading;
use crate::session::SessionStatus;

const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub(super) struct TokenQuery {
    token: String,
}

/// WS /ws/session?token=…: browsers cannot set headers on the upgrade, so the token rides
/// in the query string.
pub(super) async fn ws_session(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // Subscribe before the upgrade so no reading appended in between is missed.
    let rx = state.sessions.subscribe(&q.token).await?;
    let status = state.sessions.status(&q.token).await?;
    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_session(socket, rx, status).await {
            tracing::info!(error = %e, operation = "ws_session", "session stream error");
        }
    }))
}

async fn send_text(socket: &mut WebSocket, json: String) -> bool {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    matches!(r, Ok(Ok(())))
}

async fn stream_session(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<Reading>,
    status: SessionStatus,
) -> anyhow::Result<()> {
    tracing::info!(user_id = status.user_id, "client connected to session stream");

    let welcome = serde_json::json!({ "type": "status", "status": status });
    if !send_text(&mut socket, serde_json::to_string(&welcome)?).await {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(reading) => {
                        let msg = serde_json::json!({ "type": "reading", "reading": reading });
                        if !send_text(&mut socket, serde_json::to_string(&msg)?).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "session stream client lagged");
                    }
                    // Session closed (logout or shutdown).
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    Ok(())
}
