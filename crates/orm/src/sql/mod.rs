//! SQL Generation
//!
//! The clause compiler plus the statement shells that wrap its output.
//! Identifiers are written unquoted; every identifier reaching this module
//! has already passed [`crate::security::validate_identifier`] or comes
//! from validated model configuration.

pub mod compiler;

pub use compiler::{compile, compile_where, CompiledClause};

use crate::backends::DatabaseValue;

fn with_tail(head: String, tail: &CompiledClause) -> String {
    if tail.is_empty() {
        head
    } else {
        format!("{} {}", head, tail.sql)
    }
}

/// `SELECT <columns> FROM <table> <tail>`
pub fn select_statement(table: &str, columns: &str, tail: CompiledClause) -> CompiledClause {
    CompiledClause {
        sql: with_tail(format!("SELECT {} FROM {}", columns, table), &tail),
        params: tail.params,
    }
}

/// `SELECT COUNT(*) AS count FROM <table> <where>`
pub fn count_statement(table: &str, where_clause: CompiledClause) -> CompiledClause {
    select_statement(table, "COUNT(*) AS count", where_clause)
}

/// Single-row INSERT with columns in the given order
pub fn insert_statement(table: &str, fields: &[(String, DatabaseValue)]) -> CompiledClause {
    let columns: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
    let placeholders = vec!["?"; fields.len()].join(", ");
    CompiledClause {
        sql: format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders),
        params: fields.iter().map(|(_, value)| value.clone()).collect(),
    }
}

/// `UPDATE <table> SET a = ?, ... <where>`; SET parameters precede WHERE parameters
pub fn update_statement(table: &str, sets: &[(String, DatabaseValue)], where_clause: CompiledClause) -> CompiledClause {
    let assignments: Vec<String> = sets.iter().map(|(name, _)| format!("{} = ?", name)).collect();
    let mut params: Vec<DatabaseValue> = sets.iter().map(|(_, value)| value.clone()).collect();
    let sql = with_tail(format!("UPDATE {} SET {}", table, assignments.join(", ")), &where_clause);
    params.extend(where_clause.params);
    CompiledClause { sql, params }
}

/// `DELETE FROM <table> <where>`
pub fn delete_statement(table: &str, where_clause: CompiledClause) -> CompiledClause {
    CompiledClause {
        sql: with_tail(format!("DELETE FROM {}", table), &where_clause),
        params: where_clause.params,
    }
}
