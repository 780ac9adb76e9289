//! Error types for ob-store

use rusqlite::ErrorCode;
use std::fmt;
use thiserror::Error;

use crate::guard::ForeignKeyViolation;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection error (S001)
    #[error("[S001] Store connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (S002)
    #[error("[S002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Transaction management error (S003)
    #[error("[S003] Store transaction failed: {0}")]
    TransactionError(String),

    /// Another connection holds the write lock (S004)
    #[error("[S004] Store is busy: {0}")]
    Busy(String),

    /// A statement was interrupted because the unit's deadline passed (S005)
    #[error("[S005] Store operation interrupted: {0}")]
    Interrupted(String),

    /// Referential integrity check failed (S006)
    #[error("[S006] Foreign key check failed with {} violation(s): {}", .0.len(), summarize(.0))]
    ForeignKeyViolation(Vec<ForeignKeyViolation>),

    /// SQLite driver error with preserved source chain (S007)
    #[error("[S007] SQLite error")]
    Sqlite(#[source] rusqlite::Error),
}

/// Result type alias for StoreError
pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::Busy(err.to_string())
            }
            Some(ErrorCode::OperationInterrupted) => StoreError::Interrupted(err.to_string()),
            _ => StoreError::Sqlite(err),
        }
    }
}

impl StoreError {
    /// Classify a driver error, attaching `context` unless it is a busy or
    /// interrupted condition callers match on.
    pub fn with_context(err: rusqlite::Error, context: impl fmt::Display) -> Self {
        match StoreError::from(err) {
            StoreError::Sqlite(inner) => StoreError::ExecutionError(format!("{context}: {inner}")),
            other => other,
        }
    }
}

fn summarize(violations: &[ForeignKeyViolation]) -> String {
    const SHOWN: usize = 5;
    let mut parts: Vec<String> = violations
        .iter()
        .take(SHOWN)
        .map(ToString::to_string)
        .collect();
    if violations.len() > SHOWN {
        parts.push(format!("and {} more", violations.len() - SHOWN));
    }
    parts.join(", ")
}
