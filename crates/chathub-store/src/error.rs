//! Storage error types.

/// Errors returned by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),

    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Filesystem failure while opening the database.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
