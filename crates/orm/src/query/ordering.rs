//! Query Builder ORDER BY, LIMIT and aggregate selection

use crate::conditions::{OrderClause, OrderDirection};

use super::builder::QueryBuilder;

impl<M> QueryBuilder<M> {
    /// Add ORDER BY clause
    pub fn order_by(&mut self, field: &str, direction: OrderDirection) -> &mut Self {
        if self.check_identifier(field) {
            self.state.order_by.push(OrderClause::new(field, direction));
        }
        self
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(&mut self, field: &str) -> &mut Self {
        self.order_by(field, OrderDirection::Desc)
    }

    /// Set LIMIT and, optionally, OFFSET. Passing `None` keeps any offset
    /// set earlier. The offset only renders when a limit is present and it
    /// is greater than zero.
    pub fn limit(&mut self, count: u64, offset: impl Into<Option<u64>>) -> &mut Self {
        self.state.limit = Some(count);
        if let Some(offset) = offset.into() {
            self.state.offset = Some(offset);
        }
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.state.offset = Some(offset);
        self
    }

    /// Select `SUM(field) AS alias`. When any sums are requested the
    /// SELECT list holds only the sums.
    pub fn select_sum(&mut self, field: &str, alias: &str) -> &mut Self {
        if self.check_identifier(field) && self.check_identifier(alias) {
            self.state.sum_fields.push((alias.to_string(), field.to_string()));
        }
        self
    }
}
