//! Model configuration
//!
//! Table, primary key, writable-field whitelist and the timestamp and
//! soft-delete policies for one entity. Built once, validated, then shared
//! read-only by every builder for that entity.

use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, OrmResult};
use crate::model::lifecycle::ModelHooks;
use crate::security::validate_identifier;

#[derive(Clone)]
pub struct ModelConfig {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub allowed_fields: Vec<String>,
    pub timestamps: bool,
    pub created_at_column: String,
    pub updated_at_column: String,
    pub soft_deletes: bool,
    pub deleted_at_column: Option<String>,
    pub hooks: Option<Arc<dyn ModelHooks>>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("allowed_fields", &self.allowed_fields)
            .field("timestamps", &self.timestamps)
            .field("soft_deletes", &self.soft_deletes)
            .field("deleted_at_column", &self.deleted_at_column)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl ModelConfig {
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> ModelConfigBuilder {
        ModelConfigBuilder::new(name, table)
    }

    pub fn is_allowed(&self, field: &str) -> bool {
        self.allowed_fields.iter().any(|f| f == field)
    }

    /// Column used by soft delete, restore and the trashed filters
    pub fn soft_delete_column(&self) -> OrmResult<&str> {
        if !self.soft_deletes {
            return Err(ModelError::Configuration(format!(
                "Model '{}' does not have soft deletes enabled",
                self.name
            )));
        }
        self.deleted_at_column.as_deref().ok_or_else(|| {
            ModelError::Configuration(format!(
                "Model '{}' enables soft deletes but has no deleted-at column",
                self.name
            ))
        })
    }
}

pub struct ModelConfigBuilder {
    config: ModelConfig,
}

impl ModelConfigBuilder {
    fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            config: ModelConfig {
                name: name.into(),
                table: table.into(),
                primary_key: "id".to_string(),
                allowed_fields: Vec::new(),
                timestamps: false,
                created_at_column: "created_at".to_string(),
                updated_at_column: "updated_at".to_string(),
                soft_deletes: false,
                deleted_at_column: None,
                hooks: None,
            },
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.config.primary_key = column.into();
        self
    }

    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.config.timestamps = enabled;
        self
    }

    pub fn timestamp_columns(mut self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.config.created_at_column = created_at.into();
        self.config.updated_at_column = updated_at.into();
        self
    }

    pub fn soft_deletes(mut self, enabled: bool) -> Self {
        self.config.soft_deletes = enabled;
        self
    }

    pub fn soft_delete_column(mut self, column: impl Into<String>) -> Self {
        self.config.deleted_at_column = Some(column.into());
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.config.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> OrmResult<ModelConfig> {
        let config = self.config;
        let invalid = |what: &str, err: ModelError| {
            ModelError::Configuration(format!("Model '{}' has an invalid {}: {}", config.name, what, err))
        };

        if config.name.trim().is_empty() {
            return Err(ModelError::Configuration("Model name cannot be empty".to_string()));
        }
        if config.table.trim().is_empty() {
            return Err(ModelError::Configuration(format!("Model '{}' has no table name", config.name)));
        }
        validate_identifier(&config.table).map_err(|e| invalid("table name", e))?;

        if config.primary_key.trim().is_empty() {
            return Err(ModelError::Configuration(format!("Model '{}' has no primary key", config.name)));
        }
        validate_identifier(&config.primary_key).map_err(|e| invalid("primary key", e))?;

        if config.allowed_fields.is_empty() {
            return Err(ModelError::Configuration(format!(
                "Model '{}' has no allowed fields",
                config.name
            )));
        }
        for field in &config.allowed_fields {
            validate_identifier(field).map_err(|e| invalid("allowed field", e))?;
        }

        if config.timestamps {
            validate_identifier(&config.created_at_column).map_err(|e| invalid("created-at column", e))?;
            validate_identifier(&config.updated_at_column).map_err(|e| invalid("updated-at column", e))?;
        }
        if let Some(column) = &config.deleted_at_column {
            validate_identifier(column).map_err(|e| invalid("deleted-at column", e))?;
        }

        Ok(config)
    }
}
