//! Query Conditions and Clauses
//!
//! Plain value objects describing WHERE predicates and ORDER BY entries.
//! They carry no behavior beyond structure; rendering lives in
//! [`crate::sql::compiler`].

pub mod ordering;

pub use ordering::*;

use std::fmt;
use std::str::FromStr;

use crate::backends::DatabaseValue;
use crate::error::ModelError;

/// Comparison operators for simple conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

impl FromStr for QueryOperator {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" => Ok(QueryOperator::Equal),
            "!=" | "<>" => Ok(QueryOperator::NotEqual),
            ">" => Ok(QueryOperator::GreaterThan),
            ">=" => Ok(QueryOperator::GreaterThanOrEqual),
            "<" => Ok(QueryOperator::LessThan),
            "<=" => Ok(QueryOperator::LessThanOrEqual),
            "LIKE" => Ok(QueryOperator::Like),
            "NOT LIKE" => Ok(QueryOperator::NotLike),
            _ => Err(ModelError::Validation(format!("Unsupported operator '{}'", s))),
        }
    }
}

/// Accepts either a typed operator or its SQL spelling (`">="`, `"not like"`)
pub trait IntoOperator {
    fn into_operator(self) -> Result<QueryOperator, ModelError>;
}

impl IntoOperator for QueryOperator {
    fn into_operator(self) -> Result<QueryOperator, ModelError> {
        Ok(self)
    }
}

impl IntoOperator for &str {
    fn into_operator(self) -> Result<QueryOperator, ModelError> {
        self.parse()
    }
}

/// How the children of a group are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => " AND ",
            Conjunction::Or => " OR ",
        }
    }
}

/// A single predicate or a nested group of predicates
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple {
        field: String,
        operator: QueryOperator,
        value: DatabaseValue,
    },
    InList {
        field: String,
        values: Vec<DatabaseValue>,
        negated: bool,
    },
    Between {
        field: String,
        low: DatabaseValue,
        high: DatabaseValue,
        negated: bool,
    },
    NullCheck {
        field: String,
        is_not: bool,
    },
    /// Pre-validated SQL with its own bound parameters
    Raw {
        fragment: String,
        params: Vec<DatabaseValue>,
    },
    Group {
        conjunction: Conjunction,
        children: Vec<Condition>,
    },
}

impl Condition {
    pub fn simple(field: impl Into<String>, operator: QueryOperator, value: impl Into<DatabaseValue>) -> Self {
        Condition::Simple {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        Self::simple(field, QueryOperator::Equal, value)
    }

    pub fn in_list<V: Into<DatabaseValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::InList {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V: Into<DatabaseValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::InList {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn between(field: impl Into<String>, low: impl Into<DatabaseValue>, high: impl Into<DatabaseValue>) -> Self {
        Condition::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::NullCheck { field: field.into(), is_not: false }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Condition::NullCheck { field: field.into(), is_not: true }
    }

    pub fn raw(fragment: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        Condition::Raw { fragment: fragment.into(), params }
    }

    pub fn group(conjunction: Conjunction, children: Vec<Condition>) -> Self {
        Condition::Group { conjunction, children }
    }

    /// Field the predicate tests, if it has one
    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::Simple { field, .. }
            | Condition::InList { field, .. }
            | Condition::Between { field, .. }
            | Condition::NullCheck { field, .. } => Some(field),
            Condition::Raw { .. } | Condition::Group { .. } => None,
        }
    }
}
