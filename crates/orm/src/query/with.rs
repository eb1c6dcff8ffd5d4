//! Query Builder WITH Methods - Eager loading integration for QueryBuilder

use crate::relationships::{EagerLoadOptions, EagerLoadRequest};

use super::builder::QueryBuilder;

impl<M> QueryBuilder<M> {
    /// Eager-load relation paths (e.g. `["posts", "posts.comments"]`) on the
    /// next terminal fetch. Repeated calls before that fetch accumulate.
    pub fn with<I, S>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_options(paths, EagerLoadOptions::default())
    }

    /// Eager-load with per-path constraints and an optional depth bound
    pub fn with_options<I, S>(&mut self, paths: I, options: EagerLoadOptions) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .eager
            .get_or_insert_with(EagerLoadRequest::new)
            .merge(paths, options);
        self
    }
}
