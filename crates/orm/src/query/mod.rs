//! Query Builder Module - fluent query builder bound to a registered entity

pub mod builder;
pub mod dml;
pub mod execution;
pub mod ordering;
pub mod pagination;
pub mod types;
pub mod where_clause;
pub mod with;

// Re-export main types and builder
pub use builder::QueryBuilder;
pub use types::{Paginated, QueryState};

pub use crate::conditions::{OrderDirection, QueryOperator};
