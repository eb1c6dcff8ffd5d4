//! Query Builder WHERE clause operations

use crate::backends::{DatabaseValue, SqlDialect};
use crate::conditions::{Condition, Conjunction, IntoOperator, QueryOperator};
use crate::error::ModelError;
use crate::security::validate_raw_fragment;

use super::builder::QueryBuilder;

impl<M> QueryBuilder<M> {
    /// Add WHERE condition with equality
    ///
    /// NULL is rejected; use [`QueryBuilder::where_null`] to test for nullity.
    pub fn where_eq(&mut self, field: &str, value: impl Into<DatabaseValue>) -> &mut Self {
        self.where_op(field, QueryOperator::Equal, value)
    }

    /// Add WHERE condition with an explicit operator
    pub fn where_op(&mut self, field: &str, operator: impl IntoOperator, value: impl Into<DatabaseValue>) -> &mut Self {
        let operator = match operator.into_operator() {
            Ok(operator) => operator,
            Err(err) => {
                self.defer_error(err);
                return self;
            }
        };
        let value = value.into();
        if value.is_null() {
            self.defer_error(ModelError::Validation(format!(
                "NULL cannot be compared with '{}' on '{}'; use where_null or where_not_null",
                operator, field
            )));
            return self;
        }
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::simple(field, operator, value))
    }

    /// Add WHERE condition with greater than
    pub fn where_gt(&mut self, field: &str, value: impl Into<DatabaseValue>) -> &mut Self {
        self.where_op(field, QueryOperator::GreaterThan, value)
    }

    /// Add WHERE condition with less than
    pub fn where_lt(&mut self, field: &str, value: impl Into<DatabaseValue>) -> &mut Self {
        self.where_op(field, QueryOperator::LessThan, value)
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(&mut self, field: &str, pattern: impl Into<DatabaseValue>) -> &mut Self {
        self.where_op(field, QueryOperator::Like, pattern)
    }

    /// Add WHERE condition with IN; an empty list adds nothing to the SQL
    pub fn where_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::in_list(field, values))
    }

    /// Add WHERE condition with NOT IN; an empty list adds nothing to the SQL
    pub fn where_not_in<I, V>(&mut self, field: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::not_in_list(field, values))
    }

    pub fn where_between(
        &mut self,
        field: &str,
        low: impl Into<DatabaseValue>,
        high: impl Into<DatabaseValue>,
    ) -> &mut Self {
        self.push_between(field, low.into(), high.into(), false)
    }

    pub fn where_not_between(
        &mut self,
        field: &str,
        low: impl Into<DatabaseValue>,
        high: impl Into<DatabaseValue>,
    ) -> &mut Self {
        self.push_between(field, low.into(), high.into(), true)
    }

    fn push_between(&mut self, field: &str, low: DatabaseValue, high: DatabaseValue, negated: bool) -> &mut Self {
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::Between {
            field: field.to_string(),
            low,
            high,
            negated,
        })
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(&mut self, field: &str) -> &mut Self {
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::is_null(field))
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(&mut self, field: &str) -> &mut Self {
        if !self.check_identifier(field) {
            return self;
        }
        self.push_condition(Condition::is_not_null(field))
    }

    /// Add a raw SQL predicate with `?` placeholders.
    ///
    /// The fragment may only reference the primary key and allowed fields and
    /// may not contain statement-altering keywords. It is inserted verbatim,
    /// so wrap OR expressions in parentheses.
    pub fn where_raw(&mut self, fragment: &str, params: Vec<DatabaseValue>) -> &mut Self {
        if let Err(err) = validate_raw_fragment(
            fragment,
            params.len(),
            &self.model.allowed_fields,
            &self.model.primary_key,
        ) {
            self.defer_error(err);
            return self;
        }
        self.push_condition(Condition::raw(fragment.trim(), params))
    }

    /// Nested conditions joined by AND, wrapped in parentheses
    pub fn where_group<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.push_group(Conjunction::And, build)
    }

    /// Nested conditions joined by OR, wrapped in parentheses
    pub fn or_where_group<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.push_group(Conjunction::Or, build)
    }

    fn push_group<F>(&mut self, conjunction: Conjunction, build: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        let outer = std::mem::take(&mut self.state.conditions);
        self.group_depth += 1;
        build(self);
        self.group_depth -= 1;
        let children = std::mem::replace(&mut self.state.conditions, outer);
        if !children.is_empty() {
            self.push_condition(Condition::group(conjunction, children));
        }
        self
    }

    /// JSON column contains `value`
    pub fn where_json_contains(&mut self, field: &str, value: impl Into<DatabaseValue>) -> &mut Self {
        if !self.check_identifier(field) {
            return self;
        }
        let dialect = self.db.dialect();
        let value = value.into();
        let param = match dialect {
            SqlDialect::MySQL => DatabaseValue::String(value.to_json().to_string()),
            SqlDialect::SQLite => value,
        };
        self.push_condition(Condition::raw(dialect.json_contains(field), vec![param]))
    }

    /// Natural-language search across `fields`
    pub fn where_full_text(&mut self, fields: &[&str], term: &str) -> &mut Self {
        if fields.is_empty() {
            self.defer_error(ModelError::Validation("Full-text search needs at least one field".to_string()));
            return self;
        }
        for field in fields {
            if !self.check_identifier(field) {
                return self;
            }
        }
        let dialect = self.db.dialect();
        let (fragment, binds) = dialect.full_text(fields);
        let param = match dialect {
            SqlDialect::MySQL => term.to_string(),
            SqlDialect::SQLite => format!("%{}%", term),
        };
        self.push_condition(Condition::raw(fragment, vec![DatabaseValue::String(param); binds]))
    }

    /// Restrict to soft-deleted rows
    pub fn only_trashed(&mut self) -> &mut Self {
        match self.model.soft_delete_column() {
            Ok(column) => {
                let column = column.to_string();
                self.push_condition(Condition::is_not_null(column))
            }
            Err(err) => {
                self.defer_error(err);
                self
            }
        }
    }

    /// Restrict to rows that are not soft-deleted
    pub fn without_trashed(&mut self) -> &mut Self {
        match self.model.soft_delete_column() {
            Ok(column) => {
                let column = column.to_string();
                self.push_condition(Condition::is_null(column))
            }
            Err(err) => {
                self.defer_error(err);
                self
            }
        }
    }
}
