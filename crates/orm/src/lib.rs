//! # quarry-orm: Active-Record data layer for MySQL and SQLite
//!
//! A fluent query builder over a small, fixed set of clause shapes,
//! relation declarations (hasOne, hasMany, belongsTo, belongsToMany) and
//! batched eager loading that issues one query per relation per level.
//!
//! ```ignore
//! let db = Database::connect(&DatabaseConfig::new("sqlite::memory:")).await?;
//! db.register::<User>()?;
//! db.register::<Post>()?;
//!
//! let users = db
//!     .query::<User>()?
//!     .where_eq("status", "active")
//!     .with(["posts.comments"])
//!     .get()
//!     .await?;
//! ```

pub mod backends;
pub mod conditions;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod query;
pub mod relationships;
pub mod security;
pub mod sql;
pub mod transaction;


// Re-export core traits and types
pub use backends::{
    DatabaseBackendType, DatabaseConnection, DatabaseDriver, DatabaseRow, DatabaseValue,
    ExecuteResult, Executor, MySqlDriver, RowKey, SqlDialect, SqliteDriver,
};
pub use conditions::{Condition, Conjunction, OrderClause, OrderDirection, QueryOperator};
pub use config::{ConfigError, DatabaseConfig};
pub use database::Database;
pub use error::*;
pub use model::*;
pub use query::{Paginated, QueryBuilder, QueryState};
pub use relationships::{EagerLoadOptions, RelationDescriptor, RelationKind, RelationRegistry};
pub use sql::CompiledClause;
pub use transaction::with_transaction;
