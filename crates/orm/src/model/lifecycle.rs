//! Validation and lifecycle hooks around write operations
//!
//! Writes run in a fixed order: `validate`, `before_*`, timestamp policy,
//! statement execution, `after_*`. An error from any hook aborts the write;
//! errors raised before execution mean no SQL is issued.

use async_trait::async_trait;

use crate::backends::DatabaseValue;
use crate::error::OrmResult;
use crate::model::record::Fields;

/// Which write a validation call is guarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
}

#[async_trait]
pub trait ModelHooks: Send + Sync {
    /// Validate a whitelisted payload
    async fn validate(&self, _data: &Fields, _operation: WriteOperation) -> OrmResult<()> {
        Ok(())
    }

    async fn before_create(&self, _data: &mut Fields) -> OrmResult<()> {
        Ok(())
    }

    async fn after_create(&self, _id: &DatabaseValue, _data: &Fields) -> OrmResult<()> {
        Ok(())
    }

    async fn before_update(&self, _data: &mut Fields) -> OrmResult<()> {
        Ok(())
    }

    async fn after_update(&self, _data: &Fields, _affected: u64) -> OrmResult<()> {
        Ok(())
    }

    /// Runs before hard deletes and soft deletes
    async fn before_delete(&self) -> OrmResult<()> {
        Ok(())
    }

    async fn after_delete(&self, _affected: u64) -> OrmResult<()> {
        Ok(())
    }
}
