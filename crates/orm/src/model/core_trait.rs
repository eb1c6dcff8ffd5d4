//! Core Model Trait - typed entities mapped onto a table
//!
//! A `Model` describes its table, key, writable fields and relations as
//! associated functions. Registering it with a [`crate::Database`] turns
//! that description into a [`ModelConfig`] plus registry entries; rows are
//! converted into the type through serde.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};
use crate::model::config::ModelConfig;
use crate::model::lifecycle::ModelHooks;
use crate::model::record::{Fields, Record};
use crate::relationships::RelationDescriptor;

/// Core trait for database models
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity name used in the registry and for default key names
    fn model_name() -> &'static str;

    /// Table name for this model
    fn table_name() -> &'static str;

    /// Primary key column name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Columns accepted by insert and update
    fn allowed_fields() -> &'static [&'static str];

    /// Check if this model uses timestamps (created_at, updated_at)
    fn uses_timestamps() -> bool {
        false
    }

    /// Check if this model supports soft deletes
    fn uses_soft_deletes() -> bool {
        false
    }

    /// Column written by soft delete
    fn deleted_at_column() -> Option<&'static str> {
        Some("deleted_at")
    }

    /// Relations declared on this model, by name
    fn relations() -> Vec<(&'static str, RelationDescriptor)> {
        Vec::new()
    }

    fn hooks() -> Option<Arc<dyn ModelHooks>> {
        None
    }

    /// Validated configuration derived from the associated functions
    fn config() -> ModelResult<ModelConfig> {
        let mut builder = ModelConfig::builder(Self::model_name(), Self::table_name())
            .primary_key(Self::primary_key_name())
            .allowed_fields(Self::allowed_fields().iter().copied())
            .timestamps(Self::uses_timestamps())
            .soft_deletes(Self::uses_soft_deletes());
        if let Some(column) = Self::deleted_at_column() {
            builder = builder.soft_delete_column(column);
        }
        if let Some(hooks) = Self::hooks() {
            builder = builder.hooks(hooks);
        }
        builder.build()
    }

    /// Convert a fetched record, including loaded relations
    fn from_record(record: Record) -> ModelResult<Self> {
        record.deserialize()
    }

    /// Serialize this instance into a write payload
    fn to_fields(&self) -> ModelResult<Fields> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(name, value)| (name, DatabaseValue::from_json(value)))
                .collect()),
            other => Err(ModelError::Serialization(format!(
                "Model '{}' did not serialize to an object: {}",
                Self::model_name(),
                other
            ))),
        }
    }
}

/// Conversion applied to every row a query returns
pub trait FromRecord: Sized + Send {
    fn from_record(record: Record) -> ModelResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> ModelResult<Self> {
        Ok(record)
    }
}

impl<M: Model> FromRecord for M {
    fn from_record(record: Record) -> ModelResult<Self> {
        <M as Model>::from_record(record)
    }
}
