//! SQLite Backend Implementation
//!
//! SQLite driver on top of sqlx. Rows are decoded by the storage class of
//! each value, so a column declared `DATETIME` still comes back as text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow as SqlxSqliteRow};
use sqlx::{Column, Row as SqlxRow, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::warn;

use super::core::*;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool with the limits and timeouts from `config`
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let mut options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout() {
            options = options.idle_timeout(idle_timeout);
        }
        if let Some(max_lifetime) = config.max_lifetime() {
            options = options.max_lifetime(max_lifetime);
        }

        let pool = options
            .connect(&config.url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create SQLite pool: {}", e)))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Executor for SqliteDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = build_query(sql, params)?.fetch_all(&self.pool).await?;
        Ok(wrap_rows(rows))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        let result = build_query(sql, params)?.execute(&self.pool).await?;
        Ok(execute_result(result))
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    async fn acquire(&self) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to acquire connection: {}", e)))?;
        Ok(Arc::new(SqliteConnection::new(conn)))
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// One pooled connection, held until [`DatabaseConnection::release`]
pub struct SqliteConnection {
    conn: Mutex<Option<PoolConnection<Sqlite>>>,
    in_transaction: AtomicBool,
}

impl SqliteConnection {
    pub fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            in_transaction: AtomicBool::new(false),
        }
    }

    async fn run_control(&self, sql: &str) -> OrmResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(released)?;
        sqlx::query(sql)
            .execute(&mut **conn)
            .await
            .map_err(|e| OrmError::Transaction(format!("{} failed: {}", sql, e)))?;
        Ok(())
    }
}

#[async_trait]
impl Executor for SqliteConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(released)?;
        let rows = build_query(sql, params)?.fetch_all(&mut **conn).await?;
        Ok(wrap_rows(rows))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(released)?;
        let result = build_query(sql, params)?.execute(&mut **conn).await?;
        Ok(execute_result(result))
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn begin_transaction(&self) -> OrmResult<()> {
        self.run_control("BEGIN").await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> OrmResult<()> {
        self.run_control("COMMIT").await?;
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.run_control("ROLLBACK").await
    }

    async fn release(&self) -> OrmResult<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            warn!("Releasing SQLite connection with an open transaction; rolling back");
            self.run_control("ROLLBACK").await?;
        }
        // Dropping the pool connection returns it to the pool
        self.conn.lock().await.take();
        Ok(())
    }
}

fn released() -> OrmError {
    OrmError::Connection("Connection has already been released".to_string())
}

fn build_query<'q>(sql: &'q str, params: &[DatabaseValue]) -> OrmResult<SqliteQuery<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_database_value(query, param)?;
    }
    Ok(query)
}

fn wrap_rows(rows: Vec<SqlxSqliteRow>) -> Vec<Box<dyn DatabaseRow>> {
    rows.into_iter()
        .map(|row| Box::new(SqliteRow::new(row)) as Box<dyn DatabaseRow>)
        .collect()
}

fn execute_result(result: sqlx::sqlite::SqliteQueryResult) -> ExecuteResult {
    let rowid = result.last_insert_rowid();
    ExecuteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: (rowid > 0).then_some(DatabaseValue::Int64(rowid)),
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(query: SqliteQuery<'q>, value: &DatabaseValue) -> OrmResult<SqliteQuery<'q>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float32(f) => Ok(query.bind(*f as f64)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        other => {
            let prepared = SqlDialect::SQLite.prepare_value(other.clone())?;
            bind_database_value(query, &prepared)
        }
    }
}

/// SQLite row implementation
pub struct SqliteRow {
    row: SqlxSqliteRow,
}

impl SqliteRow {
    pub fn new(row: SqlxSqliteRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for SqliteRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        sqlite_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| OrmError::Database(format!("Column '{}' not found", name)))?;
        sqlite_value_to_database_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.row.columns().iter().map(|col| col.name().to_string()).collect()
    }
}

/// Convert a SQLite value to DatabaseValue by its storage class
fn sqlite_value_to_database_value(row: &SqlxSqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| OrmError::Database(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    let decode_error = |e: sqlx::Error| OrmError::Database(format!("Failed to decode {} value: {}", type_name, e));
    match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" => row.try_get_unchecked::<i64, _>(index).map(DatabaseValue::Int64).map_err(decode_error),
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(DatabaseValue::Bool).map_err(decode_error),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get_unchecked::<f64, _>(index).map(DatabaseValue::Float64).map_err(decode_error)
        }
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(index).map(DatabaseValue::Bytes).map_err(decode_error),
        _ => row.try_get_unchecked::<String, _>(index).map(DatabaseValue::String).map_err(decode_error),
    }
}
