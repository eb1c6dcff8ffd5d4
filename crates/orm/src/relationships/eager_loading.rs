//! Eager Loading Requests - relation paths, per-path constraints and depth
//!
//! A request is attached to a builder by `with`/`with_options` and consumed
//! by the next terminal fetch. Dotted paths are merged into a tree so that
//! `posts` and `posts.comments` share a single `posts` batch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::Record;
use crate::query::QueryBuilder;
use crate::relationships::registry::RelationRegistry;

/// Mutation applied to the target builder of one relation batch
pub type RelationConstraint = Arc<dyn Fn(&mut QueryBuilder<Record>) + Send + Sync>;

/// Constraints keyed by full dotted path, plus an optional depth bound
#[derive(Clone, Default)]
pub struct EagerLoadOptions {
    pub constraints: HashMap<String, RelationConstraint>,
    pub max_depth: Option<usize>,
}

impl EagerLoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain the batch query for `path` (e.g. `"posts.comments"`)
    pub fn constrain<F>(mut self, path: impl Into<String>, constraint: F) -> Self
    where
        F: Fn(&mut QueryBuilder<Record>) + Send + Sync + 'static,
    {
        self.constraints.insert(path.into(), Arc::new(constraint));
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

impl fmt::Debug for EagerLoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.constraints.keys().collect();
        paths.sort();
        f.debug_struct("EagerLoadOptions")
            .field("constraints", &paths)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Pending eager-load work for one terminal fetch
#[derive(Clone, Default)]
pub struct EagerLoadRequest {
    paths: Vec<String>,
    constraints: HashMap<String, RelationConstraint>,
    max_depth: Option<usize>,
}

impl EagerLoadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add paths and options; repeated paths are kept once, later
    /// constraints for the same path replace earlier ones.
    pub fn merge<I, S>(&mut self, paths: I, options: EagerLoadOptions)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            let path = path.into();
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
        self.constraints.extend(options.constraints);
        if options.max_depth.is_some() {
            self.max_depth = options.max_depth;
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn constraint(&self, path: &str) -> Option<&RelationConstraint> {
        self.constraints.get(path)
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Merge the dotted paths into a tree, keeping first-appearance order
    pub fn tree(&self) -> ModelResult<Vec<PathNode>> {
        let mut roots: Vec<PathNode> = Vec::new();
        for path in &self.paths {
            let segments: Vec<&str> = path.split('.').map(str::trim).collect();
            if segments.iter().any(|segment| segment.is_empty()) {
                return Err(ModelError::Validation(format!("Malformed eager-load path '{}'", path)));
            }
            insert_path(&mut roots, &segments, "");
        }
        Ok(roots)
    }

    /// Check every path against the registry before any query runs
    pub fn validate(&self, registry: &RelationRegistry, entity: &str) -> ModelResult<Vec<PathNode>> {
        let tree = self.tree()?;
        validate_nodes(registry, entity, &tree)?;
        Ok(tree)
    }
}

impl fmt::Debug for EagerLoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut constrained: Vec<&String> = self.constraints.keys().collect();
        constrained.sort();
        f.debug_struct("EagerLoadRequest")
            .field("paths", &self.paths)
            .field("constrained", &constrained)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// One relation in the merged path tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub name: String,
    /// Full dotted path from the root entity, used to look up constraints
    pub path: String,
    pub children: Vec<PathNode>,
}

fn insert_path(nodes: &mut Vec<PathNode>, segments: &[&str], prefix: &str) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let path = if prefix.is_empty() {
        first.to_string()
    } else {
        format!("{}.{}", prefix, first)
    };

    let index = match nodes.iter().position(|node| node.name == *first) {
        Some(index) => index,
        None => {
            nodes.push(PathNode {
                name: first.to_string(),
                path: path.clone(),
                children: Vec::new(),
            });
            nodes.len() - 1
        }
    };
    insert_path(&mut nodes[index].children, rest, &path);
}

fn validate_nodes(registry: &RelationRegistry, entity: &str, nodes: &[PathNode]) -> ModelResult<()> {
    for node in nodes {
        let link = registry.resolve(entity, &node.name)?;
        validate_nodes(registry, &link.target.name, &node.children)?;
    }
    Ok(())
}
