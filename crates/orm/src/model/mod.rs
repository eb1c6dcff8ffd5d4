//! Model System
//!
//! - `config`: per-entity table, key, whitelist and write policies
//! - `core_trait`: typed `Model` trait and row conversion
//! - `record`: untyped rows with attached relations
//! - `lifecycle`: validation and write hooks

pub mod config;
pub mod core_trait;
pub mod lifecycle;
pub mod record;

pub use config::{ModelConfig, ModelConfigBuilder};
pub use core_trait::{FromRecord, Model};
pub use lifecycle::{ModelHooks, WriteOperation};
pub use record::{Fields, Record, RelationValue};
