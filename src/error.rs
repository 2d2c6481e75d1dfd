use std::time::Duration;
use thiserror::Error;

/// Pipeline-level error taxonomy.
///
/// Only `Cancelled` and `Unexpected` unwind past the orchestrator; the
/// other variants are absorbed at the stage boundary and converted into
/// an informational finding or a silent empty stage contribution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external tool could not execute (non-fatal; the stage
    /// contributes zero findings).
    #[error("{stage} tool execution failed: {message}")]
    ToolExecution { stage: &'static str, message: String },

    /// The active-scan daemon could not be reached (non-fatal; the
    /// stage is skipped).
    #[error("scan daemon unavailable: {0}")]
    DaemonUnavailable(String),

    /// A stage ran out of its time budget (non-fatal; the stage is
    /// skipped, keeping whatever was retrievable).
    #[error("stage did not complete within {0:?}")]
    StageTimeout(Duration),

    /// The user cancelled the scan (fatal; terminal state `cancelled`).
    #[error("scan cancelled by user")]
    Cancelled,

    /// Anything outside the guarded stage boundaries (fatal; terminal
    /// state `failed`, zero persisted findings).
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Errors from the active-scan daemon HTTP client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon request failed: {0}")]
    Network(String),

    #[error("daemon returned HTTP {0}")]
    Status(u16),

    #[error("invalid daemon response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DaemonError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DaemonError::Network("request timed out".to_string())
        } else if err.is_connect() {
            DaemonError::Network("failed to connect to daemon".to_string())
        } else {
            DaemonError::Network(err.to_string())
        }
    }
}

/// Store-level errors, wrapping the sqlx driver for the production
/// backend and synthesized directly by the in-memory test store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}
