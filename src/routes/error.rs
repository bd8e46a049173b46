// Maps domain errors onto HTTP statuses. Body: {"error": "..."}.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::{AccountError, PollError, ReportError, SessionError, ValidationError};

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(String),
    Forbidden,
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "admin role required".to_string()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => ApiError::Unauthorized(e.to_string()),
            SessionError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            SessionError::InvalidDuration(_) => ApiError::BadRequest(e.to_string()),
            SessionError::Source(PollError::Persistence(p)) => ApiError::Internal(p.into()),
            // The sensor client rejected the endpoint.
            SessionError::Source(_) => ApiError::BadRequest(e.to_string()),
            SessionError::Persistence(p) => ApiError::Internal(p.into()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::DuplicateUsername(_) => ApiError::Conflict(e.to_string()),
            AccountError::InvalidCredentials => ApiError::Unauthorized(e.to_string()),
            AccountError::Invalid(_) => ApiError::BadRequest(e.to_string()),
            AccountError::Storage(inner) => ApiError::Internal(inner),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        ApiError::Unprocessable(e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Unprocessable(e.to_string())
    }
}
