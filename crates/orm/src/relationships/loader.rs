//! Relation Resolver - batched eager loading
//!
//! Each relation at each level costs one query (two for belongsToMany: the
//! pivot rows, then the targets), whatever the number of parents. Nested
//! paths recurse on the fetched children before they are attached to their
//! parents, so every copy of a child carries its own nested relations.
//!
//! Recursion stops at the depth bound, on an empty batch, or when a batch
//! with the same entity, parent keys and relation names comes around again.
//! The last case catches paths that walk a relation cycle back to rows
//! already loaded, e.g. `posts.author.posts`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::backends::{DatabaseValue, RowKey};
use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelConfig, Record, RelationValue};
use crate::query::QueryBuilder;
use crate::relationships::eager_loading::{EagerLoadRequest, PathNode};
use crate::relationships::metadata::{PivotKeys, RelationKind};
use crate::relationships::registry::RelationLink;
use crate::sql;

/// Identity of one resolution batch, used to stop relation cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    entity: String,
    /// Sorted, deduplicated primary keys of the parents
    parent_keys: Vec<RowKey>,
    /// Sorted relation names requested on this batch
    relations: Vec<String>,
}

impl BatchKey {
    fn new(entity: &ModelConfig, parents: &[Record], nodes: &[PathNode]) -> Self {
        let parent_keys: BTreeSet<RowKey> = parents.iter().filter_map(|r| r.key(&entity.primary_key)).collect();
        let mut relations: Vec<String> = nodes.iter().map(|node| node.name.clone()).collect();
        relations.sort();
        Self {
            entity: entity.name.clone(),
            parent_keys: parent_keys.into_iter().collect(),
            relations,
        }
    }
}

type LevelFuture<'a> = Pin<Box<dyn Future<Output = ModelResult<()>> + Send + 'a>>;

pub struct RelationResolver<'r> {
    db: &'r Database,
    request: &'r EagerLoadRequest,
    max_depth: usize,
    seen: HashSet<BatchKey>,
}

impl<'r> RelationResolver<'r> {
    pub fn new(db: &'r Database, request: &'r EagerLoadRequest, max_depth: usize) -> Self {
        Self {
            db,
            request,
            max_depth,
            seen: HashSet::new(),
        }
    }

    /// Load `tree` onto `records`, which were fetched for `entity`
    pub async fn resolve(
        &mut self,
        entity: Arc<ModelConfig>,
        records: &mut Vec<Record>,
        tree: &[PathNode],
    ) -> ModelResult<()> {
        self.load_level(entity, records, tree, 0).await
    }

    fn load_level<'a>(
        &'a mut self,
        entity: Arc<ModelConfig>,
        parents: &'a mut Vec<Record>,
        nodes: &'a [PathNode],
        depth: usize,
    ) -> LevelFuture<'a> {
        Box::pin(async move {
            if parents.is_empty() || nodes.is_empty() {
                return Ok(());
            }
            if depth >= self.max_depth {
                debug!(entity = %entity.name, depth, max_depth = self.max_depth, "eager load depth limit reached");
                return Ok(());
            }
            if !self.seen.insert(BatchKey::new(&entity, parents, nodes)) {
                debug!(entity = %entity.name, depth, "skipping repeated eager load batch");
                return Ok(());
            }

            for node in nodes {
                let link = self.db.registry().resolve(&entity.name, &node.name)?;
                match link.relation.kind {
                    RelationKind::BelongsToMany => self.load_many_to_many(&link, parents, node, depth).await?,
                    _ => self.load_direct(&link, parents, node, depth).await?,
                }
            }
            Ok(())
        })
    }

    /// hasOne, hasMany and belongsTo: one `child_key IN (...)` query
    async fn load_direct(
        &mut self,
        link: &RelationLink,
        parents: &mut [Record],
        node: &PathNode,
        depth: usize,
    ) -> ModelResult<()> {
        let relation = &link.relation;
        let keys = distinct_keys(parents, &relation.parent_key);
        if keys.is_empty() {
            debug!(relation = %node.path, "no parent keys, skipping batch query");
            attach(parents, &link.name, relation.kind, &relation.parent_key, &HashMap::new());
            return Ok(());
        }

        let mut children = self.fetch_targets(link, node, &relation.child_key, keys).await?;
        debug!(
            relation = %node.path,
            parents = parents.len(),
            fetched = children.len(),
            "eager loaded relation batch"
        );

        if !node.children.is_empty() {
            self.load_level(Arc::clone(&link.target), &mut children, &node.children, depth + 1)
                .await?;
        }

        let mut grouped: HashMap<RowKey, Vec<Record>> = HashMap::new();
        for child in children {
            if let Some(key) = child.key(&relation.child_key) {
                grouped.entry(key).or_default().push(child);
            }
        }
        attach(parents, &link.name, relation.kind, &relation.parent_key, &grouped);
        Ok(())
    }

    /// belongsToMany: pivot query, then one query for the distinct targets
    async fn load_many_to_many(
        &mut self,
        link: &RelationLink,
        parents: &mut [Record],
        node: &PathNode,
        depth: usize,
    ) -> ModelResult<()> {
        let relation = &link.relation;
        let pivot = relation.pivot.as_ref().ok_or_else(|| {
            ModelError::Configuration(format!("Relation '{}' has no pivot table", link.name))
        })?;

        let keys = distinct_keys(parents, &relation.parent_key);
        if keys.is_empty() {
            debug!(relation = %node.path, "no parent keys, skipping pivot query");
            attach(parents, &link.name, relation.kind, &relation.parent_key, &HashMap::new());
            return Ok(());
        }

        let related_ids = self.fetch_pivot(pivot, keys).await?;
        let wanted: BTreeSet<RowKey> = related_ids.values().flatten().cloned().collect();

        let mut children = if wanted.is_empty() {
            Vec::new()
        } else {
            self.fetch_targets(link, node, &relation.child_key, wanted.into_iter().collect())
                .await?
        };
        debug!(
            relation = %node.path,
            parents = parents.len(),
            fetched = children.len(),
            "eager loaded many-to-many batch"
        );

        if !node.children.is_empty() {
            self.load_level(Arc::clone(&link.target), &mut children, &node.children, depth + 1)
                .await?;
        }

        let mut by_id: HashMap<RowKey, Record> = HashMap::new();
        for child in children {
            if let Some(key) = child.key(&relation.child_key) {
                by_id.entry(key).or_insert(child);
            }
        }

        // Ids without a fetched row are dropped
        let mut grouped: HashMap<RowKey, Vec<Record>> = HashMap::new();
        for (parent_key, ids) in related_ids {
            let related = ids.iter().filter_map(|id| by_id.get(id).cloned()).collect();
            grouped.insert(parent_key, related);
        }
        attach(parents, &link.name, relation.kind, &relation.parent_key, &grouped);
        Ok(())
    }

    /// Query the target entity for `column IN keys`, applying the
    /// constraint registered for this node's full path
    async fn fetch_targets(
        &self,
        link: &RelationLink,
        node: &PathNode,
        column: &str,
        keys: Vec<RowKey>,
    ) -> ModelResult<Vec<Record>> {
        let mut query: QueryBuilder<Record> = QueryBuilder::new(self.db.clone(), Arc::clone(&link.target));
        query.where_in(column, keys.into_iter().map(DatabaseValue::from));
        if let Some(constraint) = self.request.constraint(&node.path) {
            constraint(&mut query);
        }
        query.get().await
    }

    /// Parent key -> related ids, in pivot row order
    async fn fetch_pivot(&self, pivot: &PivotKeys, keys: Vec<RowKey>) -> ModelResult<HashMap<RowKey, Vec<RowKey>>> {
        let condition = crate::conditions::Condition::in_list(&pivot.foreign_key, keys);
        let columns = format!("{}, {}", pivot.foreign_key, pivot.related_key);
        let stmt = sql::select_statement(&pivot.table, &columns, sql::compile_where(&[condition]));
        let rows = self.db.fetch_all(&stmt.sql, stmt.params).await?;

        let mut related: HashMap<RowKey, Vec<RowKey>> = HashMap::new();
        for row in rows {
            if let (Some(parent), Some(target)) = (row.key(&pivot.foreign_key), row.key(&pivot.related_key)) {
                let ids = related.entry(parent).or_default();
                if !ids.contains(&target) {
                    ids.push(target);
                }
            }
        }
        Ok(related)
    }
}

fn distinct_keys(records: &[Record], column: &str) -> Vec<RowKey> {
    let keys: BTreeSet<RowKey> = records.iter().filter_map(|record| record.key(column)).collect();
    keys.into_iter().collect()
}

/// Attach grouped children to each parent by its key.
///
/// Singular relations take the first match or `None`; plural relations take
/// every match or an empty list.
fn attach(
    parents: &mut [Record],
    name: &str,
    kind: RelationKind,
    parent_key: &str,
    grouped: &HashMap<RowKey, Vec<Record>>,
) {
    for parent in parents.iter_mut() {
        let matches = parent.key(parent_key).and_then(|key| grouped.get(&key));
        let value = if kind.is_collection() {
            RelationValue::Many(matches.cloned().unwrap_or_default())
        } else {
            RelationValue::One(matches.and_then(|m| m.first()).cloned().map(Box::new))
        };
        parent.set_relation(name, value);
    }
}
