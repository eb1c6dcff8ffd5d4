//! Query Builder execution methods
//!
//! Terminal operations: compile the pending state, run it through the
//! database handle, resolve eager loads, convert rows.

use std::sync::Arc;

use crate::backends::DatabaseValue;
use crate::conditions::Condition;
use crate::error::{ModelError, ModelResult};
use crate::model::{FromRecord, Record};
use crate::relationships::RelationResolver;
use crate::sql;

use super::builder::QueryBuilder;
use super::types::QueryState;

impl<M: FromRecord> QueryBuilder<M> {
    /// Execute the query and return all matching rows
    pub async fn get(&mut self) -> ModelResult<Vec<M>> {
        let state = self.take_state()?;
        let records = self.fetch(state).await?;
        records.into_iter().map(M::from_record).collect()
    }

    /// Execute the query with `LIMIT 1`
    pub async fn first(&mut self) -> ModelResult<Option<M>> {
        let mut state = self.take_state()?;
        state.limit = Some(1);
        let records = self.fetch(state).await?;
        records.into_iter().next().map(M::from_record).transpose()
    }

    pub async fn first_or_fail(&mut self) -> ModelResult<M> {
        let table = self.model.table.clone();
        self.first().await?.ok_or(ModelError::NotFound(table))
    }

    /// Fetch by primary key, combined with any pending conditions
    pub async fn find(&mut self, id: impl Into<DatabaseValue>) -> ModelResult<Option<M>> {
        let primary_key = self.model.primary_key.clone();
        self.where_eq(&primary_key, id);
        self.first().await
    }

    pub async fn find_or_fail(&mut self, id: impl Into<DatabaseValue>) -> ModelResult<M> {
        let table = self.model.table.clone();
        self.find(id).await?.ok_or(ModelError::NotFound(table))
    }
}

impl<M> QueryBuilder<M> {
    /// Count matching rows; ordering, limits and eager loads are ignored
    pub async fn count(&mut self) -> ModelResult<u64> {
        let state = self.take_state()?;
        self.count_where(&state.conditions).await
    }

    pub async fn exists(&mut self) -> ModelResult<bool> {
        Ok(self.count().await? > 0)
    }

    pub(crate) async fn count_where(&self, conditions: &[Condition]) -> ModelResult<u64> {
        let stmt = sql::count_statement(&self.model.table, sql::compile_where(conditions));
        let rows = self.db.fetch_all(&stmt.sql, stmt.params).await?;
        let value = rows
            .first()
            .and_then(|row| row.get("count"))
            .ok_or_else(|| ModelError::Database("COUNT query returned no rows".to_string()))?;

        match value {
            DatabaseValue::String(s) => s
                .parse::<u64>()
                .map_err(|e| ModelError::Database(format!("Invalid COUNT result '{}': {}", s, e))),
            other => other
                .as_i64()
                .map(|count| count.max(0) as u64)
                .ok_or_else(|| ModelError::Database(format!("Invalid COUNT result {:?}", other))),
        }
    }

    /// Run the SELECT for `state` and resolve its eager-load request.
    ///
    /// Relation paths are checked against the registry before the first
    /// query, so an undeclared relation fails without partial results.
    pub(crate) async fn fetch(&self, state: QueryState) -> ModelResult<Vec<Record>> {
        let tree = match &state.eager {
            Some(request) if !request.is_empty() => Some(request.validate(self.db.registry(), &self.model.name)?),
            _ => None,
        };

        let stmt = self.select_for(&state);
        let mut records = self.db.fetch_all(&stmt.sql, stmt.params).await?;

        if let (Some(request), Some(tree)) = (&state.eager, tree) {
            let max_depth = request.max_depth().unwrap_or_else(|| self.db.eager_max_depth());
            RelationResolver::new(&self.db, request, max_depth)
                .resolve(Arc::clone(&self.model), &mut records, &tree)
                .await?;
        }

        Ok(records)
    }
}
