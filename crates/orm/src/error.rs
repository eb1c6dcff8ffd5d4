//! Error types for the ORM system
//!
//! One error enum covers configuration mistakes, input validation,
//! driver failures and record conversion. Configuration and validation
//! errors are always raised before any SQL reaches a driver.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Model or relation configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Caller input was rejected before SQL was produced
    #[error("Validation error: {0}")]
    Validation(String),
    /// Failure reported by the database driver
    #[error("Database error: {0}")]
    Database(String),
    /// Connection pool or connection acquisition failure
    #[error("Connection error: {0}")]
    Connection(String),
    /// Transaction begin/commit/rollback failure
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Model not found in database
    #[error("Record not found in table '{0}'")]
    NotFound(String),
    /// Insert produced no identifier
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModelError::Configuration(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::Validation(_))
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Database(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
