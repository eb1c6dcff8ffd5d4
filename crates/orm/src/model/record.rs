//! Fetched rows as structured records
//!
//! A [`Record`] keeps column values and eager-loaded relations apart: the
//! field set mirrors the row, while relations live in their own map keyed
//! by relation name.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::backends::{DatabaseRow, DatabaseValue, RowKey};
use crate::error::{ModelError, OrmResult};

/// Column name to value map used for rows and write payloads
pub type Fields = BTreeMap<String, DatabaseValue>;

/// Result of loading one relation onto one parent
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// hasOne / belongsTo; `None` when no related row exists
    One(Option<Box<Record>>),
    /// hasMany / belongsToMany; empty when no related rows exist
    Many(Vec<Record>),
}

impl RelationValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            RelationValue::One(Some(record)) => record.to_json(),
            RelationValue::One(None) => JsonValue::Null,
            RelationValue::Many(records) => JsonValue::Array(records.iter().map(Record::to_json).collect()),
        }
    }

    /// Every record held by this value
    pub fn records(&self) -> Vec<&Record> {
        match self {
            RelationValue::One(Some(record)) => vec![record.as_ref()],
            RelationValue::One(None) => Vec::new(),
            RelationValue::Many(records) => records.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Fields,
    relations: BTreeMap<String, RelationValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            relations: BTreeMap::new(),
        }
    }

    pub fn from_row(row: &dyn DatabaseRow) -> OrmResult<Self> {
        Ok(Self::from_fields(row.to_map()?))
    }

    /// Build a record from a JSON object; nested objects and arrays become JSON values
    pub fn from_json(value: JsonValue) -> OrmResult<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self::from_fields(
                map.into_iter().map(|(k, v)| (k, DatabaseValue::from_json(v))).collect(),
            )),
            other => Err(ModelError::Serialization(format!(
                "Expected a JSON object for a record, got {}",
                other
            ))),
        }
    }

    /// Chainable field setter for building payloads
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Normalized key of a column, `None` for missing or NULL values
    pub fn key(&self, column: &str) -> Option<RowKey> {
        self.fields.get(column).and_then(DatabaseValue::as_key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, value: RelationValue) {
        self.relations.insert(name.into(), value);
    }

    pub fn relations(&self) -> &BTreeMap<String, RelationValue> {
        &self.relations
    }

    /// Singular relation, `None` when not loaded or absent
    pub fn related_one(&self, name: &str) -> Option<&Record> {
        match self.relations.get(name) {
            Some(RelationValue::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// Plural relation, empty when not loaded or absent
    pub fn related_many(&self, name: &str) -> &[Record] {
        match self.relations.get(name) {
            Some(RelationValue::Many(records)) => records,
            _ => &[],
        }
    }

    /// JSON object of the fields with loaded relations nested under their names
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        for (name, value) in &self.relations {
            map.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> OrmResult<T> {
        serde_json::from_value(self.to_json()).map_err(ModelError::from)
    }
}

impl serde::Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.to_json(), serializer)
    }
}

impl DatabaseRow for Record {
    fn get_by_index(&self, index: usize) -> OrmResult<DatabaseValue> {
        self.fields
            .values()
            .nth(index)
            .cloned()
            .ok_or_else(|| ModelError::Database(format!("Column index {} out of range", index)))
    }

    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        self.fields
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::Database(format!("Column '{}' not found", name)))
    }

    fn column_count(&self) -> usize {
        self.fields.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn to_map(&self) -> OrmResult<Fields> {
        Ok(self.fields.clone())
    }
}
