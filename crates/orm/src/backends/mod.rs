//! Database Backend Abstractions
//!
//! Drivers for MySQL and SQLite behind the common [`Executor`] /
//! [`DatabaseDriver`] traits. An in-process recording driver is available
//! to tests and, behind the `test-utils` feature, to downstream crates.

pub mod core;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod mysql;
pub mod sqlite;

// Re-export core traits and types
pub use core::*;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnection, MockDriver, RecordedStatement, StatementKind};
pub use mysql::MySqlDriver;
pub use sqlite::SqliteDriver;

use crate::error::{OrmError, OrmResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    MySQL,
    SQLite,
}

impl DatabaseBackendType {
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseBackendType::MySQL => SqlDialect::MySQL,
            DatabaseBackendType::SQLite => SqlDialect::SQLite,
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::MySQL => write!(f, "mysql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Detect the backend from a connection URL
///
/// SQLite accepts the `sqlite:` scheme in both its `sqlite::memory:` and
/// `sqlite://path` forms.
pub fn detect_backend_from_url(database_url: &str) -> OrmResult<DatabaseBackendType> {
    if database_url.starts_with("sqlite:") {
        return Ok(DatabaseBackendType::SQLite);
    }

    let parsed = url::Url::parse(database_url)
        .map_err(|e| OrmError::Configuration(format!("Invalid database URL: {}", e)))?;

    parsed
        .scheme()
        .parse::<DatabaseBackendType>()
        .map_err(OrmError::Configuration)
}
