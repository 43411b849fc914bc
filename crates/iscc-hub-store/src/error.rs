//! Error types for the event store.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A unique constraint other than the nonce was violated. With a
    /// correctly sequenced log this indicates a bug or corruption.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Stored data failed to decode.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// Connection mutex was poisoned by a panicking thread.
    #[error("store connection poisoned")]
    Poisoned,

    /// Blocking task failed to complete.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
