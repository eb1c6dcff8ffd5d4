//! Clause compiler
//!
//! Renders a condition tree, an ORDER BY list and LIMIT/OFFSET into a
//! parameterized SQL fragment. Output is a pure function of the input, so
//! the same tree always yields byte-identical SQL and the same parameter
//! order. The compiler is dialect-neutral and uses `?` placeholders.

use crate::backends::DatabaseValue;
use crate::conditions::{Condition, OrderClause};

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledClause {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

impl CompiledClause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compile the full tail of a SELECT: `WHERE ... ORDER BY ... LIMIT ... OFFSET ...`.
///
/// Each part is omitted when it has nothing to render; the parts that remain
/// are joined by single spaces.
pub fn compile(
    conditions: &[Condition],
    order_by: &[OrderClause],
    limit: Option<u64>,
    offset: Option<u64>,
) -> CompiledClause {
    let mut parts = Vec::new();
    let where_clause = compile_where(conditions);
    if !where_clause.is_empty() {
        parts.push(where_clause.sql);
    }

    if let Some(order) = compile_order_by(order_by) {
        parts.push(order);
    }

    if let Some(limit) = limit {
        parts.push(format!("LIMIT {}", limit));
        if let Some(offset) = offset.filter(|o| *o > 0) {
            parts.push(format!("OFFSET {}", offset));
        }
    }

    CompiledClause {
        sql: parts.join(" "),
        params: where_clause.params,
    }
}

/// Compile top-level conditions into `WHERE ...`, or an empty clause when
/// nothing renders (no conditions, or only empty IN lists and groups).
pub fn compile_where(conditions: &[Condition]) -> CompiledClause {
    let mut params = Vec::new();
    let predicates: Vec<String> = conditions
        .iter()
        .filter_map(|condition| compile_condition(condition, &mut params))
        .collect();

    if predicates.is_empty() {
        return CompiledClause::default();
    }

    CompiledClause {
        sql: format!("WHERE {}", predicates.join(" AND ")),
        params,
    }
}

fn compile_order_by(order_by: &[OrderClause]) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }
    let entries: Vec<String> = order_by
        .iter()
        .map(|clause| format!("{} {}", clause.field, clause.direction))
        .collect();
    Some(format!("ORDER BY {}", entries.join(", ")))
}

/// Render one condition, appending its parameters. Returns `None` for
/// nodes that compile to nothing; such nodes contribute no parameters.
fn compile_condition(condition: &Condition, params: &mut Vec<DatabaseValue>) -> Option<String> {
    match condition {
        Condition::Simple { field, operator, value } => {
            params.push(value.clone());
            Some(format!("{} {} ?", field, operator))
        }
        Condition::InList { field, values, negated } => {
            if values.is_empty() {
                return None;
            }
            params.extend(values.iter().cloned());
            let placeholders = vec!["?"; values.len()].join(", ");
            let keyword = if *negated { "NOT IN" } else { "IN" };
            Some(format!("{} {} ({})", field, keyword, placeholders))
        }
        Condition::Between { field, low, high, negated } => {
            params.push(low.clone());
            params.push(high.clone());
            let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
            Some(format!("{} {} ? AND ?", field, keyword))
        }
        Condition::NullCheck { field, is_not } => {
            if *is_not {
                Some(format!("{} IS NOT NULL", field))
            } else {
                Some(format!("{} IS NULL", field))
            }
        }
        Condition::Raw { fragment, params: bound } => {
            params.extend(bound.iter().cloned());
            Some(fragment.clone())
        }
        Condition::Group { conjunction, children } => {
            let parts: Vec<String> = children
                .iter()
                .filter_map(|child| compile_condition(child, params))
                .collect();
            if parts.is_empty() {
                return None;
            }
            Some(format!("({})", parts.join(conjunction.as_sql())))
        }
    }
}
