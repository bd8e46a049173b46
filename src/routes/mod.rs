// HTTP + WebSocket routes

mod error;
mod http;
mod ws;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::accounts::AccountRepo;
use crate::history_repo::HistoryRepo;
use crate::session::SessionManager;

/// Header carrying the token returned by POST /api/login.
pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) history: Arc<HistoryRepo>,
    pub(crate) accounts: Arc<AccountRepo>,
}

pub fn app(
    sessions: Arc<SessionManager>,
    history: Arc<HistoryRepo>,
    accounts: Arc<AccountRepo>,
) -> Router {
    let state = AppState {
        sessions,
        history,
        accounts,
    };
    Router::new()
        .route("/", get(|| async { "Vitals dashboard" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/users", post(http::register)) // POST /api/users
        .route("/api/login", post(http::login)) // POST /api/login
        .route("/api/logout", post(http::logout)) // POST /api/logout
        .route("/api/account/username", put(http::update_username))
        .route("/api/account/password", put(http::update_password))
        .route("/api/account", delete(http::delete_account))
        .route("/api/session/start", post(http::session_start))
        .route("/api/session/stop", post(http::session_stop))
        .route("/api/session/clear", post(http::session_clear))
        .route("/api/session/status", get(http::session_status))
        .route("/api/session/readings", get(http::session_readings))
        .route("/api/session/summary", get(http::session_summary))
        .route("/api/session/export.csv", get(http::session_export))
        .route("/api/health_data/{user_id}", get(http::health_data))
        .route("/api/report", post(http::report))
        .route("/api/views", post(http::views))
        .route("/api/admin/users", get(http::admin_users))
        .route(
            "/api/admin/users/{user_id}/readings",
            get(http::admin_user_readings),
        )
        .route("/ws/session", get(ws::ws_session)) // WS /ws/session?token=
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state)
}
