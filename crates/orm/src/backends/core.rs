//! Core Database Backend Traits
//!
//! This module defines the narrow driver interface the query layer talks to,
//! plus the value and row types that cross it. Drivers only need to run a
//! parameterized statement and report rows or an execution summary; the
//! query layer owns everything else.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};

/// Statement runner shared by pools and single connections
#[async_trait]
pub trait Executor: Send + Sync {
    /// Dialect of the underlying database
    fn dialect(&self) -> SqlDialect;

    /// Execute a query and return the result rows
    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a statement and return the affected row count and insert id
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult>;
}

/// A single connection checked out of a pool
///
/// Transaction primitives are plain statements on the connection. A
/// connection must be released exactly once; releasing with a transaction
/// still open rolls it back.
#[async_trait]
pub trait DatabaseConnection: Executor {
    async fn begin_transaction(&self) -> OrmResult<()>;

    async fn commit(&self) -> OrmResult<()>;

    async fn rollback(&self) -> OrmResult<()>;

    /// Return the connection to its pool
    async fn release(&self) -> OrmResult<()>;
}

/// A pool of connections
#[async_trait]
pub trait DatabaseDriver: Executor {
    /// Acquire a dedicated connection from the pool
    async fn acquire(&self) -> OrmResult<Arc<dyn DatabaseConnection>>;

    /// Close the pool
    async fn close(&self) -> OrmResult<()>;
}

/// Summary of a write statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<DatabaseValue>,
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column count
    fn column_count(&self) -> usize;

    /// Get column names
    fn column_names(&self) -> Vec<String>;

    /// Convert row to JSON value
    fn to_json(&self) -> OrmResult<JsonValue> {
        let mut map = serde_json::Map::new();
        for (name, value) in self.to_map()? {
            map.insert(name, value.to_json());
        }
        Ok(JsonValue::Object(map))
    }

    /// Convert row to an ordered column map
    fn to_map(&self) -> OrmResult<BTreeMap<String, DatabaseValue>> {
        let mut map = BTreeMap::new();
        for (index, name) in self.column_names().into_iter().enumerate() {
            map.insert(name, self.get_by_index(index)?);
        }
        Ok(map)
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(DateTime<Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Normalized identity used to match keys across tables.
    ///
    /// Integer widths collapse into one variant so an `INT` foreign key
    /// matches a `BIGINT` primary key. NULL has no identity.
    pub fn as_key(&self) -> Option<RowKey> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(RowKey::Int(*b as i64)),
            DatabaseValue::Int32(i) => Some(RowKey::Int(*i as i64)),
            DatabaseValue::Int64(i) => Some(RowKey::Int(*i)),
            DatabaseValue::Float32(f) if f.fract() == 0.0 => Some(RowKey::Int(*f as i64)),
            DatabaseValue::Float64(f) if f.fract() == 0.0 => Some(RowKey::Int(*f as i64)),
            DatabaseValue::Float32(f) => Some(RowKey::Text(f.to_string())),
            DatabaseValue::Float64(f) => Some(RowKey::Text(f.to_string())),
            DatabaseValue::String(s) => Some(RowKey::Text(s.clone())),
            DatabaseValue::Bytes(b) => Some(RowKey::Bytes(b.clone())),
            DatabaseValue::Uuid(u) => Some(RowKey::Text(u.to_string())),
            DatabaseValue::DateTime(dt) => Some(RowKey::Text(dt.to_rfc3339())),
            DatabaseValue::Date(d) => Some(RowKey::Text(d.to_string())),
            DatabaseValue::Time(t) => Some(RowKey::Text(t.to_string())),
            DatabaseValue::Json(_) | DatabaseValue::Array(_) => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::Number(serde_json::Number::from(x))).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Create DatabaseValue from JSON value
    ///
    /// Strings stay strings; objects and arrays are kept as JSON documents.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        DatabaseValue::Int32(i as i32)
                    } else {
                        DatabaseValue::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            other => DatabaseValue::Json(other),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<u32> for DatabaseValue {
    fn from(value: u32) -> Self {
        DatabaseValue::Int64(value as i64)
    }
}

impl From<f32> for DatabaseValue {
    fn from(value: f32) -> Self {
        DatabaseValue::Float32(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<chrono::NaiveTime> for DatabaseValue {
    fn from(value: chrono::NaiveTime) -> Self {
        DatabaseValue::Time(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Hashable, totally ordered identity of a key column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<RowKey> for DatabaseValue {
    fn from(key: RowKey) -> Self {
        match key {
            RowKey::Int(i) => DatabaseValue::Int64(i),
            RowKey::Text(s) => DatabaseValue::String(s),
            RowKey::Bytes(b) => DatabaseValue::Bytes(b),
        }
    }
}

/// SQL dialect enumeration
///
/// The clause compiler never looks at the dialect. Only value formatting
/// and the JSON containment / full-text fragments branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    MySQL,
    SQLite,
}

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::MySQL => "mysql",
            SqlDialect::SQLite => "sqlite",
        }
    }

    /// Render a timestamp the way the dialect stores it
    pub fn format_timestamp(&self, value: &DateTime<Utc>) -> String {
        match self {
            SqlDialect::MySQL => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            SqlDialect::SQLite => value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        }
    }

    /// Value written by the timestamp and soft-delete policies
    pub fn now_value(&self) -> DatabaseValue {
        DatabaseValue::String(self.format_timestamp(&Utc::now()))
    }

    /// Normalize a parameter into something every driver can bind
    pub fn prepare_value(&self, value: DatabaseValue) -> OrmResult<DatabaseValue> {
        match value {
            DatabaseValue::DateTime(dt) => Ok(DatabaseValue::String(self.format_timestamp(&dt))),
            DatabaseValue::Date(d) => Ok(DatabaseValue::String(d.format("%Y-%m-%d").to_string())),
            DatabaseValue::Time(t) => Ok(DatabaseValue::String(t.format("%H:%M:%S").to_string())),
            DatabaseValue::Uuid(u) => Ok(DatabaseValue::String(u.to_string())),
            DatabaseValue::Json(j) => Ok(DatabaseValue::String(j.to_string())),
            DatabaseValue::Array(_) => Err(OrmError::Validation(
                "array values cannot be bound as a single parameter; use where_in".to_string(),
            )),
            other => Ok(other),
        }
    }

    /// Predicate testing that a JSON column contains one value
    pub fn json_contains(&self, field: &str) -> String {
        match self {
            SqlDialect::MySQL => format!("JSON_CONTAINS({}, ?)", field),
            SqlDialect::SQLite => format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value = ?)",
                field
            ),
        }
    }

    /// Full-text predicate over `fields` and the number of times the search
    /// term must be bound
    pub fn full_text(&self, fields: &[&str]) -> (String, usize) {
        match self {
            SqlDialect::MySQL => (
                format!("MATCH({}) AGAINST(? IN NATURAL LANGUAGE MODE)", fields.join(", ")),
                1,
            ),
            SqlDialect::SQLite => {
                let parts: Vec<String> = fields.iter().map(|f| format!("{} LIKE ?", f)).collect();
                (format!("({})", parts.join(" OR ")), fields.len())
            }
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
