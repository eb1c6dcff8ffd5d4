//! Query Builder - Core builder implementation
//!
//! Fluent methods mutate the builder in place and return `&mut Self`, so two
//! references to one builder observe the same pending state. Every terminal
//! or persistence call takes the state out of the builder before doing
//! anything else, which leaves the builder fresh even when the call fails.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::conditions::Condition;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelConfig, Record};
use crate::security::validate_identifier;
use crate::sql::{self, CompiledClause};

use super::types::QueryState;

/// Query builder bound to one entity
pub struct QueryBuilder<M = Record> {
    pub(crate) db: Database,
    pub(crate) model: Arc<ModelConfig>,
    pub(crate) state: QueryState,
    /// First input error seen while building; raised by the next terminal call
    pub(crate) pending_error: Option<ModelError>,
    pub(crate) group_depth: usize,
    _phantom: PhantomData<fn() -> M>,
}

impl<M> std::fmt::Debug for QueryBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("model", &self.model.name)
            .field("state", &self.state)
            .field("pending_error", &self.pending_error)
            .finish()
    }
}

impl<M> QueryBuilder<M> {
    /// Create a new query builder
    pub fn new(db: Database, model: Arc<ModelConfig>) -> Self {
        Self {
            db,
            model,
            state: QueryState::default(),
            pending_error: None,
            group_depth: 0,
            _phantom: PhantomData,
        }
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Pending state, for inspection
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Nesting level of the `where_group` call currently running
    pub fn group_depth(&self) -> usize {
        self.group_depth
    }

    /// Render the pending SELECT without executing it or clearing state
    pub fn to_sql(&self) -> ModelResult<CompiledClause> {
        if let Some(err) = &self.pending_error {
            return Err(err.clone());
        }
        Ok(self.select_for(&self.state))
    }

    pub(crate) fn select_for(&self, state: &QueryState) -> CompiledClause {
        let tail = sql::compile(&state.conditions, &state.order_by, state.limit, state.offset);
        sql::select_statement(&self.model.table, &state.select_columns(), tail)
    }

    /// Take the accumulated state, leaving a fresh builder behind.
    ///
    /// A deferred build error is returned here, after the reset.
    pub(crate) fn take_state(&mut self) -> ModelResult<QueryState> {
        let state = std::mem::take(&mut self.state);
        self.group_depth = 0;
        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    /// Record a build error; the first one wins
    pub(crate) fn defer_error(&mut self, err: ModelError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
    }

    /// Validate an identifier, deferring the error on failure
    pub(crate) fn check_identifier(&mut self, identifier: &str) -> bool {
        match validate_identifier(identifier) {
            Ok(()) => true,
            Err(err) => {
                self.defer_error(err);
                false
            }
        }
    }

    pub(crate) fn push_condition(&mut self, condition: Condition) -> &mut Self {
        self.state.conditions.push(condition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockDriver;
    use crate::conditions::OrderDirection;

    fn builder() -> QueryBuilder {
        let db = Database::new(Arc::new(MockDriver::new()));
        let config = ModelConfig::builder("User", "users")
            .allowed_fields(["name", "status", "age"])
            .build()
            .unwrap();
        QueryBuilder::new(db, Arc::new(config))
    }

    #[test]
    fn test_to_sql_does_not_reset() {
        let mut query = builder();
        query.where_eq("status", "active").order_by("name", OrderDirection::Asc);

        let first = query.to_sql().unwrap();
        let second = query.to_sql().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sql, "SELECT * FROM users WHERE status = ? ORDER BY name ASC");
        assert!(!query.state().is_pristine());
    }

    #[test]
    fn test_limit_keeps_earlier_offset() {
        let mut query = builder();
        query.offset(20).limit(10, None);
        assert_eq!(query.to_sql().unwrap().sql, "SELECT * FROM users LIMIT 10 OFFSET 20");

        query.limit(5, 40);
        assert_eq!(query.to_sql().unwrap().sql, "SELECT * FROM users LIMIT 5 OFFSET 40");
    }

    #[test]
    fn test_take_state_resets_even_with_error() {
        let mut query = builder();
        query.where_eq("bad column", 1).where_eq("status", "active");
        assert!(query.to_sql().is_err());

        let err = query.take_state().unwrap_err();
        assert!(err.is_validation());
        assert!(query.state().is_pristine());
        assert!(query.to_sql().is_ok());
    }

    #[test]
    fn test_first_error_wins() {
        let mut query = builder();
        query.where_eq("one two", 1).where_eq("three four", 2);
        let err = query.take_state().unwrap_err();
        assert!(err.to_string().contains("one two"));
    }
}
