//! Query Builder DML operations (INSERT, UPDATE, DELETE)
//!
//! Every write takes the builder state first, so pending predicates are
//! consumed even when the write fails. Updates and deletes refuse to run
//! without a WHERE clause; all input checks happen before any hook runs or
//! any SQL reaches the driver.

use tracing::{debug, warn};

use crate::backends::DatabaseValue;
use crate::conditions::Condition;
use crate::error::{ModelError, ModelResult};
use crate::model::{Fields, Model, WriteOperation};
use crate::sql::{self, CompiledClause};

use super::builder::QueryBuilder;

impl<M> QueryBuilder<M> {
    /// Insert one row and return its identifier.
    ///
    /// Fields outside the whitelist are dropped. The identifier is the
    /// primary key from `data` when present, otherwise the driver's
    /// generated id.
    pub async fn insert(&mut self, data: Fields) -> ModelResult<DatabaseValue> {
        self.take_state()?;
        let mut data = self.filter_fields(data, WriteOperation::Create);
        if data.is_empty() {
            return Err(ModelError::Validation(format!(
                "No writable fields supplied for insert into '{}'",
                self.model.table
            )));
        }

        if let Some(hooks) = &self.model.hooks {
            hooks.validate(&data, WriteOperation::Create).await?;
            hooks.before_create(&mut data).await?;
        }

        if self.model.timestamps {
            let now = self.db.dialect().now_value();
            data.insert(self.model.created_at_column.clone(), now.clone());
            data.insert(self.model.updated_at_column.clone(), now);
        }

        let columns: Vec<(String, DatabaseValue)> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let stmt = sql::insert_statement(&self.model.table, &columns);
        let result = self.db.execute(&stmt.sql, stmt.params).await?;

        let id = match data.get(&self.model.primary_key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => result.last_insert_id.ok_or(ModelError::MissingPrimaryKey)?,
        };
        debug!(table = %self.model.table, id = ?id, "inserted row");

        if let Some(hooks) = &self.model.hooks {
            hooks.after_create(&id, &data).await?;
        }
        Ok(id)
    }

    /// Insert a typed model through its field mapping
    pub async fn create(&mut self, model: &M) -> ModelResult<DatabaseValue>
    where
        M: Model,
    {
        let fields = model.to_fields()?;
        self.insert(fields).await
    }

    /// Update the rows matched by the pending conditions
    pub async fn update(&mut self, data: Fields) -> ModelResult<u64> {
        let state = self.take_state()?;
        self.run_update(state.conditions, data).await
    }

    /// Update one row by primary key, within any pending conditions
    pub async fn update_by_id(&mut self, id: impl Into<DatabaseValue>, data: Fields) -> ModelResult<u64> {
        let mut conditions = self.take_state()?.conditions;
        conditions.push(self.id_condition(id.into())?);
        self.run_update(conditions, data).await
    }

    /// Update several rows by primary key; the list may not be empty
    pub async fn update_by_ids<I, V>(&mut self, ids: I, data: Fields) -> ModelResult<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        let mut conditions = self.take_state()?.conditions;
        conditions.push(self.ids_condition(ids)?);
        self.run_update(conditions, data).await
    }

    /// Delete the rows matched by the pending conditions
    pub async fn delete(&mut self) -> ModelResult<u64> {
        let state = self.take_state()?;
        self.run_delete(state.conditions).await
    }

    pub async fn delete_by_id(&mut self, id: impl Into<DatabaseValue>) -> ModelResult<u64> {
        let mut conditions = self.take_state()?.conditions;
        conditions.push(self.id_condition(id.into())?);
        self.run_delete(conditions).await
    }

    pub async fn delete_by_ids<I, V>(&mut self, ids: I) -> ModelResult<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        let mut conditions = self.take_state()?.conditions;
        conditions.push(self.ids_condition(ids)?);
        self.run_delete(conditions).await
    }

    /// Mark the matched rows deleted by stamping the deleted-at column
    pub async fn soft_delete(&mut self) -> ModelResult<u64> {
        let state = self.take_state()?;
        self.run_soft_delete(state.conditions).await
    }

    pub async fn soft_delete_by_id(&mut self, id: impl Into<DatabaseValue>) -> ModelResult<u64> {
        let mut conditions = self.take_state()?.conditions;
        self.model.soft_delete_column()?;
        conditions.push(self.id_condition(id.into())?);
        self.run_soft_delete(conditions).await
    }

    /// Clear the deleted-at column on the matched rows
    pub async fn restore(&mut self) -> ModelResult<u64> {
        let state = self.take_state()?;
        self.run_restore(state.conditions).await
    }

    pub async fn restore_by_id(&mut self, id: impl Into<DatabaseValue>) -> ModelResult<u64> {
        let mut conditions = self.take_state()?.conditions;
        self.model.soft_delete_column()?;
        conditions.push(self.id_condition(id.into())?);
        self.run_restore(conditions).await
    }

    /// Whitelist filter. An explicit non-null primary key survives only on
    /// insert; updates never rewrite it.
    fn filter_fields(&self, mut data: Fields, operation: WriteOperation) -> Fields {
        let pk = &self.model.primary_key;
        let keep_pk = operation == WriteOperation::Create && data.get(pk).is_some_and(|v| !v.is_null());
        if !keep_pk && data.remove(pk).is_some_and(|v| !v.is_null()) {
            warn!(table = %self.model.table, primary_key = %pk, "ignoring primary key in update data");
        }
        let (kept, dropped): (Fields, Fields) = data
            .into_iter()
            .partition(|(field, _)| self.model.is_allowed(field) || (keep_pk && field == pk));
        if !dropped.is_empty() {
            let names: Vec<&str> = dropped.keys().map(String::as_str).collect();
            warn!(table = %self.model.table, fields = ?names, "dropping fields outside the whitelist");
        }
        kept
    }

    fn id_condition(&self, id: DatabaseValue) -> ModelResult<Condition> {
        if id.is_null() {
            return Err(ModelError::Validation(format!(
                "Primary key '{}' cannot be NULL",
                self.model.primary_key
            )));
        }
        Ok(Condition::eq(self.model.primary_key.clone(), id))
    }

    fn ids_condition<I, V>(&self, ids: I) -> ModelResult<Condition>
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        let ids: Vec<DatabaseValue> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(ModelError::Validation("Id list cannot be empty".to_string()));
        }
        if ids.iter().any(DatabaseValue::is_null) {
            return Err(ModelError::Validation("Id list cannot contain NULL".to_string()));
        }
        Ok(Condition::in_list(self.model.primary_key.clone(), ids))
    }

    /// WHERE clause for a write; an empty one is an error
    fn write_scope(&self, conditions: &[Condition], verb: &str) -> ModelResult<CompiledClause> {
        let clause = sql::compile_where(conditions);
        if clause.is_empty() {
            return Err(ModelError::Validation(format!(
                "Refusing to {} the entire '{}' table without a WHERE clause",
                verb, self.model.table
            )));
        }
        Ok(clause)
    }

    async fn run_update(&self, conditions: Vec<Condition>, data: Fields) -> ModelResult<u64> {
        let mut data = self.filter_fields(data, WriteOperation::Update);
        if data.is_empty() {
            return Err(ModelError::Validation(format!(
                "No writable fields supplied for update of '{}'",
                self.model.table
            )));
        }
        let scope = self.write_scope(&conditions, "update")?;

        if let Some(hooks) = &self.model.hooks {
            hooks.validate(&data, WriteOperation::Update).await?;
            hooks.before_update(&mut data).await?;
        }
        if self.model.timestamps {
            data.insert(self.model.updated_at_column.clone(), self.db.dialect().now_value());
        }

        let affected = self.execute_update(&data, scope).await?;
        if let Some(hooks) = &self.model.hooks {
            hooks.after_update(&data, affected).await?;
        }
        Ok(affected)
    }

    async fn run_delete(&self, conditions: Vec<Condition>) -> ModelResult<u64> {
        let scope = self.write_scope(&conditions, "delete")?;
        if let Some(hooks) = &self.model.hooks {
            hooks.before_delete().await?;
        }

        let stmt = sql::delete_statement(&self.model.table, scope);
        let affected = self.db.execute(&stmt.sql, stmt.params).await?.rows_affected;
        debug!(table = %self.model.table, affected, "deleted rows");

        if let Some(hooks) = &self.model.hooks {
            hooks.after_delete(affected).await?;
        }
        Ok(affected)
    }

    async fn run_soft_delete(&self, conditions: Vec<Condition>) -> ModelResult<u64> {
        let column = self.model.soft_delete_column()?.to_string();
        let scope = self.write_scope(&conditions, "soft delete")?;
        if let Some(hooks) = &self.model.hooks {
            hooks.before_delete().await?;
        }

        let now = self.db.dialect().now_value();
        let mut data = Fields::new();
        if self.model.timestamps {
            data.insert(self.model.updated_at_column.clone(), now.clone());
        }
        data.insert(column, now);
        let affected = self.execute_update(&data, scope).await?;

        if let Some(hooks) = &self.model.hooks {
            hooks.after_delete(affected).await?;
        }
        Ok(affected)
    }

    async fn run_restore(&self, conditions: Vec<Condition>) -> ModelResult<u64> {
        let column = self.model.soft_delete_column()?.to_string();
        let scope = self.write_scope(&conditions, "restore")?;

        let mut data = Fields::new();
        data.insert(column, DatabaseValue::Null);
        if let Some(hooks) = &self.model.hooks {
            hooks.validate(&data, WriteOperation::Update).await?;
            hooks.before_update(&mut data).await?;
        }
        if self.model.timestamps {
            data.insert(self.model.updated_at_column.clone(), self.db.dialect().now_value());
        }

        let affected = self.execute_update(&data, scope).await?;
        if let Some(hooks) = &self.model.hooks {
            hooks.after_update(&data, affected).await?;
        }
        Ok(affected)
    }

    async fn execute_update(&self, data: &Fields, scope: CompiledClause) -> ModelResult<u64> {
        let sets: Vec<(String, DatabaseValue)> = data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let stmt = sql::update_statement(&self.model.table, &sets, scope);
        let affected = self.db.execute(&stmt.sql, stmt.params).await?.rows_affected;
        debug!(table = %self.model.table, affected, "updated rows");
        Ok(affected)
    }
}
