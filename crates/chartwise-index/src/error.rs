//! Error types for the index crate.

use thiserror::Error;

/// Errors that can occur in the index crate.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding length does not match the index.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// The index could not be reached or is in a bad state.
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
