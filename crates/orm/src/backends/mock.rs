//! Recording driver for tests
//!
//! `MockDriver` records every statement it receives and answers SELECTs
//! either from a custom handler or from in-memory table fixtures. The
//! fixture evaluator understands the statement shapes the query builder
//! emits for plain predicates: `=`, comparisons, `IN`, `NOT IN`, null
//! checks, `ORDER BY`, `LIMIT`/`OFFSET` and `COUNT(*)`. Writes are recorded
//! but never applied to fixtures.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::backends::core::{
    DatabaseConnection, DatabaseDriver, DatabaseRow, DatabaseValue, ExecuteResult, Executor, SqlDialect,
};
use crate::error::{OrmError, OrmResult};
use crate::model::Record;

type QueryHandler = Arc<dyn Fn(&str, &[DatabaseValue]) -> OrmResult<Vec<Record>> + Send + Sync>;

/// What kind of call produced a recorded statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Execute,
    /// BEGIN, COMMIT, ROLLBACK and RELEASE on an acquired connection
    Transaction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
    pub kind: StatementKind,
}

#[derive(Clone)]
pub struct MockDriver {
    dialect: SqlDialect,
    fixtures: Arc<HashMap<String, Vec<Record>>>,
    handler: Option<QueryHandler>,
    fail_on: Vec<String>,
    rows_affected: u64,
    log: Arc<Mutex<Vec<RecordedStatement>>>,
    next_id: Arc<AtomicI64>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("dialect", &self.dialect)
            .field("tables", &self.fixtures.keys().collect::<Vec<_>>())
            .field("statements", &self.lock().len())
            .finish()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            dialect: SqlDialect::SQLite,
            fixtures: Arc::new(HashMap::new()),
            handler: None,
            fail_on: Vec::new(),
            rows_affected: 1,
            log: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Answer every SELECT with `handler` instead of the fixtures
    pub fn with_query_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[DatabaseValue]) -> OrmResult<Vec<Record>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Rows of `table` served by the fixture evaluator
    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Record>) -> Self {
        Arc::make_mut(&mut self.fixtures).insert(table.into(), rows);
        self
    }

    /// Fail any statement whose SQL contains `fragment`
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on.push(fragment.into());
        self
    }

    /// Affected-row count reported by every write
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    /// Everything recorded so far, in order
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.lock().clone()
    }

    /// SQL of the recorded SELECTs
    pub fn queries(&self) -> Vec<String> {
        self.of_kind(StatementKind::Query)
    }

    pub fn query_count(&self) -> usize {
        self.queries().len()
    }

    /// SQL of the recorded writes
    pub fn executed(&self) -> Vec<String> {
        self.of_kind(StatementKind::Execute)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn of_kind(&self, kind: StatementKind) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.sql.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedStatement>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, sql: &str, params: &[DatabaseValue], kind: StatementKind) -> OrmResult<()> {
        self.lock().push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
            kind,
        });
        match self.fail_on.iter().find(|fragment| sql.contains(fragment.as_str())) {
            Some(fragment) => Err(OrmError::Database(format!("mock failure on '{}'", fragment))),
            None => Ok(()),
        }
    }

    fn run_query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.record(sql, params, StatementKind::Query)?;
        let rows = match &self.handler {
            Some(handler) => handler(sql, params)?,
            None => self.evaluate(sql, params)?,
        };
        Ok(rows.into_iter().map(|row| Box::new(row) as Box<dyn DatabaseRow>).collect())
    }

    fn run_execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        self.record(sql, params, StatementKind::Execute)?;
        let last_insert_id = if sql.starts_with("INSERT") {
            Some(DatabaseValue::Int64(self.next_id.fetch_add(1, AtomicOrdering::SeqCst)))
        } else {
            None
        };
        Ok(ExecuteResult {
            rows_affected: self.rows_affected,
            last_insert_id,
        })
    }

    fn evaluate(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Record>> {
        let statement = SelectStatement::parse(sql)?;
        let mut rows: Vec<Record> = self.fixtures.get(statement.table).cloned().unwrap_or_default();

        let mut cursor = params.iter();
        let predicates = statement
            .predicates
            .iter()
            .map(|text| Predicate::parse(text, &mut cursor))
            .collect::<OrmResult<Vec<_>>>()?;
        rows.retain(|row| predicates.iter().all(|p| p.matches(row)));

        if statement.columns == "COUNT(*) AS count" {
            return Ok(vec![Record::new().with("count", rows.len() as i64)]);
        }

        for (field, descending) in statement.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(field).unwrap_or(&DatabaseValue::Null), b.get(field).unwrap_or(&DatabaseValue::Null));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let offset = statement.offset.unwrap_or(0);
        let limit = statement.limit.unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit);

        if statement.columns == "*" {
            return Ok(rows.collect());
        }
        let columns: Vec<&str> = statement.columns.split(',').map(str::trim).collect();
        Ok(rows
            .map(|row| {
                columns.iter().fold(Record::new(), |projected, column| {
                    projected.with(*column, row.get(column).cloned().unwrap_or(DatabaseValue::Null))
                })
            })
            .collect())
    }
}

#[async_trait]
impl Executor for MockDriver {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.run_query(sql, params)
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        self.run_execute(sql, params)
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    async fn acquire(&self) -> OrmResult<Arc<dyn DatabaseConnection>> {
        Ok(Arc::new(MockConnection { driver: self.clone() }))
    }

    async fn close(&self) -> OrmResult<()> {
        Ok(())
    }
}

/// Connection handed out by [`MockDriver::acquire`]; shares the driver's log
#[derive(Debug, Clone)]
pub struct MockConnection {
    driver: MockDriver,
}

#[async_trait]
impl Executor for MockConnection {
    fn dialect(&self) -> SqlDialect {
        self.driver.dialect
    }

    async fn query(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.driver.run_query(sql, params)
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        self.driver.run_execute(sql, params)
    }
}

#[async_trait]
impl DatabaseConnection for MockConnection {
    async fn begin_transaction(&self) -> OrmResult<()> {
        self.driver.record("BEGIN", &[], StatementKind::Transaction)
    }

    async fn commit(&self) -> OrmResult<()> {
        self.driver.record("COMMIT", &[], StatementKind::Transaction)
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.driver.record("ROLLBACK", &[], StatementKind::Transaction)
    }

    async fn release(&self) -> OrmResult<()> {
        self.driver.record("RELEASE", &[], StatementKind::Transaction)
    }
}

struct SelectStatement<'a> {
    columns: &'a str,
    table: &'a str,
    predicates: Vec<&'a str>,
    order_by: Vec<(&'a str, bool)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<'a> SelectStatement<'a> {
    fn parse(sql: &'a str) -> OrmResult<Self> {
        let unsupported = || OrmError::Database(format!("mock cannot evaluate '{}'", sql));

        let rest = sql.strip_prefix("SELECT ").ok_or_else(unsupported)?;
        let (columns, rest) = rest.split_once(" FROM ").ok_or_else(unsupported)?;
        let (table, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));

        let mut predicates = Vec::new();
        if let Some(after) = rest.strip_prefix("WHERE ") {
            let end = [" ORDER BY ", " LIMIT "]
                .iter()
                .filter_map(|marker| after.find(marker))
                .min()
                .unwrap_or(after.len());
            predicates = after[..end].split(" AND ").collect();
            rest = after[end..].trim_start();
        }

        let mut order_by = Vec::new();
        if let Some(after) = rest.strip_prefix("ORDER BY ") {
            let end = after.find(" LIMIT ").unwrap_or(after.len());
            for entry in after[..end].split(", ") {
                let (field, direction) = entry.split_once(' ').ok_or_else(unsupported)?;
                order_by.push((field, direction == "DESC"));
            }
            rest = after[end..].trim_start();
        }

        let (mut limit, mut offset) = (None, None);
        if let Some(after) = rest.strip_prefix("LIMIT ") {
            let (count, skip) = match after.split_once(" OFFSET ") {
                Some((count, skip)) => (count, Some(skip)),
                None => (after, None),
            };
            limit = Some(count.trim().parse().map_err(|_| unsupported())?);
            offset = skip.map(|s| s.trim().parse()).transpose().map_err(|_| unsupported())?;
        } else if !rest.is_empty() {
            return Err(unsupported());
        }

        Ok(Self {
            columns,
            table,
            predicates,
            order_by,
            limit,
            offset,
        })
    }
}

enum Predicate {
    Compare(String, String, DatabaseValue),
    In(String, Vec<DatabaseValue>, bool),
    Null(String, bool),
}

impl Predicate {
    fn parse<'p>(text: &str, params: &mut impl Iterator<Item = &'p DatabaseValue>) -> OrmResult<Self> {
        let unsupported = || OrmError::Database(format!("mock cannot evaluate predicate '{}'", text));
        let mut next = || params.next().cloned().ok_or_else(|| OrmError::Database("mock ran out of parameters".to_string()));

        if let Some(field) = text.strip_suffix(" IS NOT NULL") {
            return Ok(Predicate::Null(field.to_string(), true));
        }
        if let Some(field) = text.strip_suffix(" IS NULL") {
            return Ok(Predicate::Null(field.to_string(), false));
        }
        for (keyword, negated) in [(" NOT IN (", true), (" IN (", false)] {
            if let Some((field, list)) = text.split_once(keyword) {
                let count = list.matches('?').count();
                let values = (0..count).map(|_| next()).collect::<OrmResult<Vec<_>>>()?;
                return Ok(Predicate::In(field.to_string(), values, negated));
            }
        }

        let parts: Vec<&str> = text.split_whitespace().collect();
        match parts.as_slice() {
            [field, op @ ("=" | "!=" | ">" | ">=" | "<" | "<="), "?"] => {
                Ok(Predicate::Compare(field.to_string(), op.to_string(), next()?))
            }
            _ => Err(unsupported()),
        }
    }

    fn matches(&self, row: &Record) -> bool {
        let value = |field: &str| row.get(field).cloned().unwrap_or(DatabaseValue::Null);
        match self {
            Predicate::Null(field, is_not) => value(field).is_null() != *is_not,
            Predicate::In(field, values, negated) => {
                let key = value(field).as_key();
                let found = key.is_some() && values.iter().any(|v| v.as_key() == key);
                found != *negated
            }
            Predicate::Compare(field, op, expected) => {
                let actual = value(field);
                if actual.is_null() {
                    return false;
                }
                let ordering = compare(&actual, expected);
                match op.as_str() {
                    "=" => ordering == Ordering::Equal,
                    "!=" => ordering != Ordering::Equal,
                    ">" => ordering == Ordering::Greater,
                    ">=" => ordering != Ordering::Less,
                    "<" => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

/// Order two values: numbers numerically, everything else by key
fn compare(a: &DatabaseValue, b: &DatabaseValue) -> Ordering {
    if let (Some(x), Some(y)) = (a.to_json().as_f64(), b.to_json().as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.as_key().cmp(&b.as_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> MockDriver {
        MockDriver::new().with_table(
            "users",
            vec![
                Record::new().with("id", 1).with("name", "ann").with("age", 30),
                Record::new().with("id", 2).with("name", "bob").with("age", 17),
                Record::new().with("id", 3).with("name", "cy").with("age", 45),
            ],
        )
    }

    #[tokio::test]
    async fn test_fixture_select() {
        let driver = driver();
        let rows = driver
            .query(
                "SELECT * FROM users WHERE age > ? ORDER BY age DESC LIMIT 1",
                &[DatabaseValue::Int32(18)],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("name").unwrap(), DatabaseValue::from("cy"));
    }

    #[tokio::test]
    async fn test_fixture_in_and_count() {
        let driver = driver();
        let rows = driver
            .query(
                "SELECT COUNT(*) AS count FROM users WHERE id IN (?, ?)",
                &[DatabaseValue::Int64(1), DatabaseValue::Int64(3)],
            )
            .await
            .unwrap();
        assert_eq!(rows[0].get_by_name("count").unwrap(), DatabaseValue::Int64(2));
        assert_eq!(driver.query_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_records_then_fails() {
        let driver = MockDriver::new().fail_on("DELETE");
        assert!(driver.execute("DELETE FROM users WHERE id = ?", &[1.into()]).await.is_err());
        assert_eq!(driver.executed(), vec!["DELETE FROM users WHERE id = ?"]);
    }

    #[tokio::test]
    async fn test_insert_ids_increment() {
        let driver = MockDriver::new();
        let first = driver.execute("INSERT INTO t (a) VALUES (?)", &[1.into()]).await.unwrap();
        let second = driver.execute("INSERT INTO t (a) VALUES (?)", &[2.into()]).await.unwrap();
        assert_eq!(first.last_insert_id, Some(DatabaseValue::Int64(1)));
        assert_eq!(second.last_insert_id, Some(DatabaseValue::Int64(2)));
    }
}
