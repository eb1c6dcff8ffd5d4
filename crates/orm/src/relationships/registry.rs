//! Relation Registry - model configurations and named relation descriptors
//!
//! Entries are write-once: registering a model or relation name twice is a
//! configuration error. Registration is expected to finish before query
//! traffic starts; after that the registry is only read.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{ModelError, ModelResult};
use crate::model::ModelConfig;
use crate::relationships::metadata::{RelationDescriptor, ResolvedRelation};

/// A resolved relation together with its target entity's configuration
#[derive(Debug, Clone)]
pub struct RelationLink {
    pub name: String,
    pub relation: ResolvedRelation,
    pub target: Arc<ModelConfig>,
}

#[derive(Debug, Default)]
pub struct RelationRegistry {
    models: DashMap<String, Arc<ModelConfig>>,
    relations: DashMap<String, HashMap<String, RelationDescriptor>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity's configuration under its model name
    pub fn register_model(&self, config: ModelConfig) -> ModelResult<Arc<ModelConfig>> {
        match self.models.entry(config.name.clone()) {
            Entry::Occupied(_) => Err(ModelError::Configuration(format!(
                "Model '{}' is already registered",
                config.name
            ))),
            Entry::Vacant(slot) => {
                let config = Arc::new(config);
                slot.insert(Arc::clone(&config));
                Ok(config)
            }
        }
    }

    /// Register a named relation on `entity`
    pub fn register_relation(
        &self,
        entity: &str,
        name: &str,
        descriptor: RelationDescriptor,
    ) -> ModelResult<()> {
        if name.is_empty() || name.contains('.') {
            return Err(ModelError::Configuration(format!(
                "Invalid relation name '{}' on '{}'",
                name, entity
            )));
        }
        descriptor.validate()?;

        let mut entity_relations = self.relations.entry(entity.to_string()).or_default();
        if entity_relations.contains_key(name) {
            return Err(ModelError::Configuration(format!(
                "Relation '{}' is already registered on '{}'",
                name, entity
            )));
        }
        entity_relations.insert(name.to_string(), descriptor);
        Ok(())
    }

    pub fn model(&self, name: &str) -> ModelResult<Arc<ModelConfig>> {
        self.models
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ModelError::Configuration(format!("Model '{}' is not registered", name)))
    }

    pub fn get(&self, entity: &str, name: &str) -> Option<RelationDescriptor> {
        self.relations
            .get(entity)
            .and_then(|relations| relations.get(name).cloned())
    }

    /// Relation names declared on `entity`, sorted
    pub fn relation_names(&self, entity: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .relations
            .get(entity)
            .map(|relations| relations.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Look up a relation and fill in its default keys.
    ///
    /// Fails when the relation is undeclared or either entity is unregistered.
    pub fn resolve(&self, entity: &str, name: &str) -> ModelResult<RelationLink> {
        let descriptor = self.get(entity, name).ok_or_else(|| {
            ModelError::Configuration(format!("Relation '{}' is not defined on '{}'", name, entity))
        })?;
        let declaring = self.model(entity)?;
        let target = self.model(&descriptor.target).map_err(|_| {
            ModelError::Configuration(format!(
                "Relation '{}' on '{}' targets unregistered model '{}'",
                name, entity, descriptor.target
            ))
        })?;

        Ok(RelationLink {
            name: name.to_string(),
            relation: descriptor.resolve(&declaring, &target),
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, table: &str) -> ModelConfig {
        ModelConfig::builder(name, table).allowed_fields(["name"]).build().unwrap()
    }

    fn registry() -> RelationRegistry {
        let registry = RelationRegistry::new();
        registry.register_model(config("User", "users")).unwrap();
        registry.register_model(config("Post", "posts")).unwrap();
        registry
            .register_relation("User", "posts", RelationDescriptor::has_many("Post"))
            .unwrap();
        registry
    }

    #[test]
    fn test_registration_is_write_once() {
        let registry = registry();
        assert!(registry.register_model(config("User", "people")).unwrap_err().is_configuration());
        assert!(registry
            .register_relation("User", "posts", RelationDescriptor::has_one("Post"))
            .unwrap_err()
            .is_configuration());
        assert_eq!(registry.model("User").unwrap().table, "users");
    }

    #[test]
    fn test_resolve() {
        let registry = registry();
        let link = registry.resolve("User", "posts").unwrap();
        assert_eq!(link.target.table, "posts");
        assert_eq!(link.relation.child_key, "user_id");
    }

    #[test]
    fn test_resolve_unknown_relation_is_configuration_error() {
        let registry = registry();
        let err = registry.resolve("User", "comments").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("comments"));
    }

    #[test]
    fn test_resolve_unregistered_target() {
        let registry = registry();
        registry
            .register_relation("User", "roles", RelationDescriptor::belongs_to_many("Role"))
            .unwrap();
        assert!(registry.resolve("User", "roles").unwrap_err().is_configuration());
    }

    #[test]
    fn test_relation_names_are_sorted() {
        let registry = registry();
        registry
            .register_relation("User", "avatar", RelationDescriptor::has_one("Post"))
            .unwrap();
        assert_eq!(registry.relation_names("User"), vec!["avatar", "posts"]);
        assert!(registry.relation_names("Post").is_empty());
        assert!(registry.register_relation("User", "a.b", RelationDescriptor::has_one("Post")).is_err());
    }
}
