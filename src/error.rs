// Error taxonomy shared by the poller, sinks, CSV import and report generation.

use thiserror::Error;

/// Durable write or read against the reading store failed.
#[derive(Error, Debug)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        PersistenceError(e.to_string())
    }
}

impl From<anyhow::Error> for PersistenceError {
    fn from(e: anyhow::Error) -> Self {
        PersistenceError(e.to_string())
    }
}

/// Anything that ends a poll run early. Every variant is fatal to the run, never to the process.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("sensor endpoint unreachable: {0}")]
    Connection(String),

    #[error("malformed sensor response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PollError {
    /// Fetch failures may be skipped by a retry policy; persistence failures never are.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            PollError::Connection(_) | PollError::MalformedResponse(_)
        )
    }
}

/// Input table rejected (CSV import).
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("line {line}: expected 4 or 5 columns, got {got}")]
    ColumnCount { line: usize, got: usize },

    #[error("line {line}, column '{column}': '{value}' is not a number")]
    NotNumeric {
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("line {line}: invalid timestamp '{value}'")]
    Timestamp { line: usize, value: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ReportError {
    #[error("no usable rows: every row was empty or contained a zero/missing value")]
    NoUsableRows,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("username '{0}' already exists")]
    DuplicateUsername(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AccountError {
    fn from(e: sqlx::Error) -> Self {
        AccountError::Storage(e.into())
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no such session")]
    NotFound,

    #[error("a poll run is already active for this session")]
    AlreadyRunning,

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error(transparent)]
    Source(#[from] PollError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
