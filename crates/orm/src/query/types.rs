//! Query Builder Types - accumulated builder state and page results

use serde::Serialize;

use crate::conditions::{Condition, OrderClause};
use crate::relationships::EagerLoadRequest;

/// Everything a builder has accumulated since its last terminal call
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    /// Top-level conditions, joined by AND
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `(alias, field)` pairs rendered as `SUM(field) AS alias`
    pub sum_fields: Vec<(String, String)>,
    pub eager: Option<EagerLoadRequest>,
}

impl QueryState {
    /// True when the state is indistinguishable from a fresh one
    pub fn is_pristine(&self) -> bool {
        self.conditions.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
            && self.sum_fields.is_empty()
            && self.eager.is_none()
    }

    /// Column list for SELECT
    pub(crate) fn select_columns(&self) -> String {
        if self.sum_fields.is_empty() {
            return "*".to_string();
        }
        self.sum_fields
            .iter()
            .map(|(alias, field)| format!("SUM({}) AS {}", field, alias))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<M> {
    pub data: Vec<M>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<M> Paginated<M> {
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }
}
