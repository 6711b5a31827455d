//! Error types for logkeep
//!
//! These errors only surface on setup paths (opening the store, spawning the
//! writer, installing a subscriber) and inside the writer thread. Logging
//! calls themselves never return them.

use thiserror::Error;

/// Main error type for logkeep operations
#[derive(Error, Debug)]
pub enum LogError {
    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization of a stored record
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error (directory creation, thread spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store rejected a record for a reason of its own
    #[error("Store error: {0}")]
    Store(String),

    /// Installing the global tracing subscriber failed
    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

/// Result type alias using LogError
pub type LogResult<T> = Result<T, LogError>;
