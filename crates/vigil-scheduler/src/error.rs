use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No item with the given ID exists in the store.
    #[error("Item not found: {id}")]
    ItemNotFound { id: i64 },

    /// The engine command loop is gone (shutdown already completed).
    #[error("Scheduler engine is not running")]
    EngineUnavailable,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
