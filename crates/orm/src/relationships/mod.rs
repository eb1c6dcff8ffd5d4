//! Relationships Module - relation metadata, registry and batched eager loading

pub mod eager_loading;
pub mod loader;
pub mod metadata;
pub mod registry;

#[cfg(test)]
mod eager_loading_tests;

// Re-export main types
pub use eager_loading::{EagerLoadOptions, EagerLoadRequest, PathNode, RelationConstraint};
pub use loader::{BatchKey, RelationResolver};

// Re-export metadata system types
pub use metadata::{PivotKeys, RelationDescriptor, RelationKind, ResolvedRelation};
pub use registry::{RelationLink, RelationRegistry};
