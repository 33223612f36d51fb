//! Error types for storage operations

use thiserror::Error;

/// Storage layer error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core domain error: {0}")]
    Core(#[from] crewplan_core::Error),

    #[error("Corrupt {table} row: {message}")]
    Corrupt { table: String, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn corrupt<T: Into<String>, M: Into<String>>(table: T, message: M) -> Self {
        Self::Corrupt {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Storage failures surface to the pipeline as core errors at the trait seams
impl From<Error> for crewplan_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            Error::Serialization(e) => crewplan_core::Error::Serialization(e.to_string()),
            Error::Conflict(message) => crewplan_core::Error::validation(message),
            other => crewplan_core::Error::Internal(format!("storage: {}", other)),
        }
    }
}

/// Convenience result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;
