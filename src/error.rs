//! Error types for Memorai

use thiserror::Error;

/// Main error type for the conversation memory system
#[derive(Error, Debug)]
pub enum MemoraiError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Store unreachable (connect or ping failed)
    #[error("Store unreachable: {0}")]
    Connectivity(String),

    /// Text generation call failed or returned nothing
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Embedding call failed or returned nothing
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// HTTP transport error talking to a model provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl MemoraiError {
    /// The store could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, MemoraiError::Connectivity(_))
    }

    /// A model provider call failed (generation, embedding or its transport).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            MemoraiError::Generation(_) | MemoraiError::Embedding(_) | MemoraiError::Http(_)
        )
    }
}

impl From<sqlx::Error> for MemoraiError {
    /// Pool exhaustion, a closed pool and socket/file I/O mean the store
    /// itself is unreachable rather than a query having failed.
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                MemoraiError::Connectivity(e.to_string())
            }
            other => MemoraiError::Database(other),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MemoraiError>;
