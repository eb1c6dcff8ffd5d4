//! Relationship Metadata - relation descriptors and their resolved key sets

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::ModelConfig;
use crate::security::validate_identifier;

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// One-to-one, foreign key on the target
    HasOne,
    /// One-to-many, foreign key on the target
    HasMany,
    /// Many-to-one, foreign key on the declaring entity
    BelongsTo,
    /// Many-to-many through a pivot table
    BelongsToMany,
}

impl RelationKind {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany)
    }

    /// Returns true if this relationship requires a pivot table
    pub fn requires_pivot(self) -> bool {
        matches!(self, Self::BelongsToMany)
    }
}

/// Declared relation between two entities.
///
/// Key names left unset are derived from the entity names when the relation
/// is resolved (see [`RelationDescriptor::resolve`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    pub target: String,
    pub foreign_key: Option<String>,
    /// Local key for hasOne/hasMany/belongsToMany; owner key for belongsTo
    pub local_key: Option<String>,
    pub pivot_table: Option<String>,
    pub related_key: Option<String>,
}

impl RelationDescriptor {
    fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            foreign_key: None,
            local_key: None,
            pivot_table: None,
            related_key: None,
        }
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn belongs_to_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsToMany, target)
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_key = Some(column.into());
        self
    }

    /// Target-side key a belongsTo foreign key points at
    pub fn owner_key(self, column: impl Into<String>) -> Self {
        self.local_key(column)
    }

    pub fn pivot_table(mut self, table: impl Into<String>) -> Self {
        self.pivot_table = Some(table.into());
        self
    }

    /// Pivot column holding the target's key
    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_key = Some(column.into());
        self
    }

    /// Validate descriptor fields before registration
    pub fn validate(&self) -> ModelResult<()> {
        if self.target.trim().is_empty() {
            return Err(ModelError::Configuration("Relation target entity cannot be empty".to_string()));
        }

        let explicit = [&self.foreign_key, &self.local_key, &self.pivot_table, &self.related_key];
        for name in explicit.into_iter().flatten() {
            validate_identifier(name)
                .map_err(|e| ModelError::Configuration(format!("Invalid relation key '{}': {}", name, e)))?;
        }

        if !self.kind.requires_pivot() && (self.pivot_table.is_some() || self.related_key.is_some()) {
            return Err(ModelError::Configuration(format!(
                "Only belongsToMany relations take a pivot table (target '{}')",
                self.target
            )));
        }

        Ok(())
    }

    /// Fill in default key names against the two entity configurations
    pub fn resolve(&self, declaring: &ModelConfig, target: &ModelConfig) -> ResolvedRelation {
        let declaring_name = declaring.name.to_lowercase();
        let target_name = target.name.to_lowercase();

        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => ResolvedRelation {
                kind: self.kind,
                parent_key: self.local_key.clone().unwrap_or_else(|| declaring.primary_key.clone()),
                child_key: self.foreign_key.clone().unwrap_or_else(|| format!("{}_id", declaring_name)),
                pivot: None,
            },
            RelationKind::BelongsTo => ResolvedRelation {
                kind: self.kind,
                parent_key: self.foreign_key.clone().unwrap_or_else(|| format!("{}_id", target_name)),
                child_key: self.local_key.clone().unwrap_or_else(|| target.primary_key.clone()),
                pivot: None,
            },
            RelationKind::BelongsToMany => ResolvedRelation {
                kind: self.kind,
                parent_key: self.local_key.clone().unwrap_or_else(|| declaring.primary_key.clone()),
                child_key: target.primary_key.clone(),
                pivot: Some(PivotKeys {
                    table: self
                        .pivot_table
                        .clone()
                        .unwrap_or_else(|| format!("{}_{}", declaring_name, target_name)),
                    foreign_key: self.foreign_key.clone().unwrap_or_else(|| format!("{}_id", declaring_name)),
                    related_key: self.related_key.clone().unwrap_or_else(|| format!("{}_id", target_name)),
                }),
            },
        }
    }
}

/// Pivot table columns for belongsToMany
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotKeys {
    pub table: String,
    /// Pivot column matching the parent's key
    pub foreign_key: String,
    /// Pivot column matching the target's primary key
    pub related_key: String,
}

/// A relation with every key name decided.
///
/// `parent_key` is read from parent records; `child_key` is the target
/// column matched against it (through the pivot for belongsToMany).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelation {
    pub kind: RelationKind,
    pub parent_key: String,
    pub child_key: String,
    pub pivot: Option<PivotKeys>,
}
