//! Storage error types

use thiserror::Error;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by repository implementations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error while opening the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the connection
    #[error("Storage lock poisoned")]
    Poisoned,

    /// The blocking worker running the query failed
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Referenced row does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored value could not be decoded
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn corrupt(column: &'static str, value: impl Into<String>) -> Self {
        Self::Corrupt {
            column,
            value: value.into(),
        }
    }

    /// Busy/locked database and worker hiccups may succeed on a later attempt
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Task(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}
