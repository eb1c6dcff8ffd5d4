//! MySQL Backend Implementation
//!
//! MySQL / MariaDB driver on top of sqlx.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow as SqlxMySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, MySql, MySqlPool, Row as SqlxRow, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::warn;

use super::core::*;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// MySQL connection pool
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    pool: MySqlPool,
}

impl MySqlDriver {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the limits and timeouts from `config`
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let mut options = MySqlPoolOptions::new()
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
            .map_err(|e| OrmError::Connection(format!("Failed to create MySQL pool: {}", e)))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Executor for MySqlDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySQL
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
impl DatabaseDriver for MySqlDriver {
    async fn acquire(&self) -> OrmResult<Arc<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to acquire connection: {}", e)))?;
        Ok(Arc::new(MySqlConnection::new(conn)))
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// One pooled connection, held until [`DatabaseConnection::release`]
pub struct MySqlConnection {
    conn: Mutex<Option<PoolConnection<MySql>>>,
    in_transaction: AtomicBool,
}

impl MySqlConnection {
    pub fn new(conn: PoolConnection<MySql>) -> Self {
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
impl Executor for MySqlConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySQL
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
impl DatabaseConnection for MySqlConnection {
    async fn begin_transaction(&self) -> OrmResult<()> {
        self.run_control("START TRANSACTION").await?;
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
            warn!("Releasing MySQL connection with an open transaction; rolling back");
            self.run_control("ROLLBACK").await?;
        }
        self.conn.lock().await.take();
        Ok(())
    }
}

fn released() -> OrmError {
    OrmError::Connection("Connection has already been released".to_string())
}

fn build_query<'q>(sql: &'q str, params: &[DatabaseValue]) -> OrmResult<MySqlQuery<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_database_value(query, param)?;
    }
    Ok(query)
}

fn wrap_rows(rows: Vec<SqlxMySqlRow>) -> Vec<Box<dyn DatabaseRow>> {
    rows.into_iter()
        .map(|row| Box::new(MySqlRow::new(row)) as Box<dyn DatabaseRow>)
        .collect()
}

fn execute_result(result: sqlx::mysql::MySqlQueryResult) -> ExecuteResult {
    let id = result.last_insert_id();
    ExecuteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: (id > 0).then(|| DatabaseValue::Int64(id as i64)),
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(query: MySqlQuery<'q>, value: &DatabaseValue) -> OrmResult<MySqlQuery<'q>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float32(f) => Ok(query.bind(*f)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        other => {
            let prepared = SqlDialect::MySQL.prepare_value(other.clone())?;
            bind_database_value(query, &prepared)
        }
    }
}

/// MySQL row implementation
pub struct MySqlRow {
    row: SqlxMySqlRow,
}

impl MySqlRow {
    pub fn new(row: SqlxMySqlRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for MySqlRow {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        mysql_value_to_database_value(&self.row, index)
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| OrmError::Database(format!("Column '{}' not found", name)))?;
        mysql_value_to_database_value(&self.row, index)
    }

    fn column_count(&self) -> usize {
        self.row.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.row.columns().iter().map(|col| col.name().to_string()).collect()
    }
}

/// Convert a MySQL column value to DatabaseValue by its declared type
fn mysql_value_to_database_value(row: &SqlxMySqlRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| OrmError::Database(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let type_name = row.columns()[index].type_info().name().to_string();

    let decode_error = |e: sqlx::Error| OrmError::Database(format!("Failed to decode {} value: {}", type_name, e));
    let value = match type_name.as_str() {
        "BOOLEAN" => DatabaseValue::Bool(row.try_get_unchecked::<bool, _>(index).map_err(decode_error)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "YEAR" | "TINYINT UNSIGNED" | "SMALLINT UNSIGNED"
        | "MEDIUMINT UNSIGNED" => DatabaseValue::Int32(row.try_get_unchecked::<i32, _>(index).map_err(decode_error)?),
        "BIGINT" => DatabaseValue::Int64(row.try_get_unchecked::<i64, _>(index).map_err(decode_error)?),
        "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            let value = row.try_get_unchecked::<u64, _>(index).map_err(decode_error)?;
            i64::try_from(value)
                .map(DatabaseValue::Int64)
                .unwrap_or_else(|_| DatabaseValue::String(value.to_string()))
        }
        "FLOAT" => DatabaseValue::Float32(row.try_get_unchecked::<f32, _>(index).map_err(decode_error)?),
        "DOUBLE" => DatabaseValue::Float64(row.try_get_unchecked::<f64, _>(index).map_err(decode_error)?),
        "DATETIME" | "TIMESTAMP" => {
            let naive = row.try_get_unchecked::<NaiveDateTime, _>(index).map_err(decode_error)?;
            DatabaseValue::DateTime(Utc.from_utc_datetime(&naive))
        }
        "DATE" => DatabaseValue::Date(row.try_get_unchecked::<NaiveDate, _>(index).map_err(decode_error)?),
        "TIME" => DatabaseValue::Time(row.try_get_unchecked::<NaiveTime, _>(index).map_err(decode_error)?),
        "JSON" => {
            let json = row
                .try_get_unchecked::<sqlx::types::Json<JsonValue>, _>(index)
                .map_err(decode_error)?;
            DatabaseValue::Json(json.0)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            DatabaseValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index).map_err(decode_error)?)
        }
        // DECIMAL, text types, ENUM and SET
        _ => DatabaseValue::String(row.try_get_unchecked::<String, _>(index).map_err(decode_error)?),
    };
    Ok(value)
}
