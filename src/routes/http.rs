// HTTP handlers: accounts, session control, history queries, report and views.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{AppState, SESSION_HEADER};
use crate::models::{DataOverview, Reading, Role};
use crate::version::{NAME, VERSION};
use crate::views::ViewSelection;

/// Window of GET /api/health_data.
const HEALTH_WINDOW_DAYS: u32 = 7;

/// Text the client must send to confirm account deletion.
const DELETE_CONFIRMATION: &str = "DELETE";

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

fn session_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", SESSION_HEADER)))
}

/// Token and user id of the calling session.
async fn caller(state: &AppState, headers: &HeaderMap) -> Result<(String, i64), ApiError> {
    let token = session_token(headers)?;
    let user_id = state.sessions.user_id(token).await?;
    Ok((token.to_string(), user_id))
}

async fn caller_role(state: &AppState, user_id: i64) -> Result<Role, ApiError> {
    let user = state
        .accounts
        .get(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
    Ok(user.role)
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let (_, user_id) = caller(state, headers).await?;
    match caller_role(state, user_id).await? {
        Role::Admin => Ok(()),
        Role::User => Err(ApiError::Forbidden),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct Credentials {
    username: String,
    password: String,
}

/// POST /api/users
pub(super) async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Response, ApiError> {
    let user = state
        .accounts
        .register(&body.username, &body.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LoginResponse {
    token: String,
    user_id: i64,
    role: Role,
}

/// POST /api/login: verifies credentials and opens a session seeded from stored history.
pub(super) async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .accounts
        .authenticate(&body.username, &body.password)
        .await?;
    let token = state.sessions.open(user.id).await?;
    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        role: user.role,
    }))
}

/// POST /api/logout: stops any active run and discards the session.
pub(super) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = session_token(&headers)?;
    state.sessions.close(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(super) struct UsernameChange {
    username: String,
}

pub(super) async fn update_username(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UsernameChange>,
) -> Result<StatusCode, ApiError> {
    let (_, user_id) = caller(&state, &headers).await?;
    state
        .accounts
        .update_username(user_id, &body.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PasswordChange {
    current_password: String,
    new_password: String,
}

pub(super) async fn update_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    let (_, user_id) = caller(&state, &headers).await?;
    state
        .accounts
        .update_password(user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteConfirmation {
    confirm: String,
}

/// DELETE /api/account: removes the account and its stored readings, then ends the session.
pub(super) async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeleteConfirmation>,
) -> Result<StatusCode, ApiError> {
    let (_, user_id) = caller(&state, &headers).await?;
    if body.confirm != DELETE_CONFIRMATION {
        return Err(ApiError::BadRequest(format!(
            "type {} to confirm account deletion",
            DELETE_CONFIRMATION
        )));
    }
    // Stop the run first so no reading is written after the rows are deleted.
    state.sessions.close_user(user_id).await;
    if !state.accounts.delete_account(user_id).await? {
        return Err(ApiError::NotFound(format!("no user with id {}", user_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartRequest {
    duration_secs: f64,
    endpoint: String,
}

/// POST /api/session/start
pub(super) async fn session_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRequest>,
) -> Result<Response, ApiError> {
    let token = session_token(&headers)?;
    if body.endpoint.trim().is_empty() {
        return Err(ApiError::BadRequest("endpoint must not be empty".into()));
    }
    state
        .sessions
        .start(token, body.duration_secs, body.endpoint.trim())
        .await?;
    let status = state.sessions.status(token).await?;
    Ok((StatusCode::ACCEPTED, Json(status)).into_response())
}

/// POST /api/session/stop: returns once the run is back to Idle.
pub(super) async fn session_stop(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    let stopped = state.sessions.stop(token).await?;
    let status = state.sessions.status(token).await?;
    Ok(Json(serde_json::json!({ "stopped": stopped, "status": status })))
}

pub(super) async fn session_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    state.sessions.clear(token).await?;
    Ok(Json(state.sessions.status(token).await?))
}

pub(super) async fn session_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    Ok(Json(state.sessions.status(token).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct SinceQuery {
    #[serde(default)]
    since: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ReadingsDelta {
    rows: Vec<Reading>,
    cursor: usize,
}

/// GET /api/session/readings?since=N: rows appended after N and the next cursor.
pub(super) async fn session_readings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<SinceQuery>,
) -> Result<Json<ReadingsDelta>, ApiError> {
    let token = session_token(&headers)?;
    let (rows, cursor) = state.sessions.rows_since(token, q.since).await?;
    Ok(Json(ReadingsDelta { rows, cursor }))
}

pub(super) async fn session_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    Ok(Json(state.sessions.summary(token).await?))
}

/// GET /api/session/export.csv: the full buffer snapshot.
pub(super) async fn session_export(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    let rows = state.sessions.snapshot(token).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"readings.csv\"",
            ),
        ],
        crate::csv::export(&rows),
    ))
}

/// GET /api/health_data/{user_id}: trailing averages. Callers see their own data; admins any.
pub(super) async fn health_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, caller_id) = caller(&state, &headers).await?;
    if caller_id != user_id && caller_role(&state, caller_id).await? != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    let averages = state
        .history
        .average_over_days(user_id, HEALTH_WINDOW_DAYS)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no data for user {} in the last {} days",
                user_id, HEALTH_WINDOW_DAYS
            ))
        })?;
    Ok(Json(averages))
}

#[derive(Debug, Deserialize)]
pub(super) struct ReportQuery {
    format: Option<String>,
}

/// POST /api/report: CSV body in, report out (JSON, or plain text with ?format=text).
pub(super) async fn report(
    Query(q): Query<ReportQuery>,
    body: String,
) -> Result<Response, ApiError> {
    let report = crate::report::generate_from_csv(&body)?;
    match q.format.as_deref() {
        Some("text") => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            report.render_text(),
        )
            .into_response()),
        None | Some("json") => Ok(Json(report).into_response()),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown report format '{}'",
            other
        ))),
    }
}

/// POST /api/views: CSV body in, selected chart data out. Flags default to true.
pub(super) async fn views(
    Query(selection): Query<ViewSelection>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let mut readings = crate::csv::import(&body)?;
    // Exported buffers start with the zero placeholder row; it would skew every chart.
    if readings.first().is_some_and(Reading::is_placeholder) {
        readings.remove(0);
    }
    if readings.is_empty() {
        return Err(ApiError::Unprocessable("no rows to plot".into()));
    }
    Ok(Json(crate::views::build(&selection, &readings)))
}

/// GET /api/admin/users
pub(super) async fn admin_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.history.users_with_data().await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdminReadings {
    user_id: i64,
    date: Option<NaiveDate>,
    readings: Vec<Reading>,
    /// Set when the requested day has no data.
    #[serde(skip_serializing_if = "Option::is_none")]
    overview: Option<DataOverview>,
}

/// GET /api/admin/users/{user_id}/readings?date=YYYY-MM-DD
pub(super) async fn admin_user_readings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Query(q): Query<DateQuery>,
) -> Result<Json<AdminReadings>, ApiError> {
    require_admin(&state, &headers).await?;
    let date = match q.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => Some(NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest(format!("date must be YYYY-MM-DD, got '{}'", d))
        })?),
        None => None,
    };

    let readings = match date {
        Some(d) => state.history.get_user_readings_on(user_id, d).await?,
        None => state.history.get_user_readings(user_id).await?,
    };
    let overview = if readings.is_empty() {
        Some(state.history.data_overview(user_id).await?)
    } else {
        None
    };
    Ok(Json(AdminReadings {
        user_id,
        date,
        readings,
        overview,
    }))
}
