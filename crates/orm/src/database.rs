//! Database Integration - the handle queries and writes run through
//!
//! A `Database` pairs a driver (or, inside a transaction, one pinned
//! connection) with the shared relation registry. It is cheap to clone;
//! clones share the pool and the registry.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::backends::{
    DatabaseBackendType, DatabaseConnection, DatabaseDriver, DatabaseValue, ExecuteResult, MySqlDriver, SqlDialect,
    SqliteDriver,
};
use crate::config::DatabaseConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelConfig, Record};
use crate::query::QueryBuilder;
use crate::relationships::{RelationDescriptor, RelationRegistry};

#[derive(Clone)]
pub(crate) enum Handle {
    Pool(Arc<dyn DatabaseDriver>),
    Transaction(Arc<dyn DatabaseConnection>),
}

#[derive(Clone)]
pub struct Database {
    pub(crate) handle: Handle,
    registry: Arc<RelationRegistry>,
    eager_max_depth: usize,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect())
            .field("transaction", &self.is_transaction())
            .field("eager_max_depth", &self.eager_max_depth)
            .finish()
    }
}

impl Database {
    /// Wrap an already-constructed driver
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            handle: Handle::Pool(driver),
            registry: Arc::new(RelationRegistry::new()),
            eager_max_depth: DatabaseConfig::DEFAULT_EAGER_MAX_DEPTH,
        }
    }

    /// Open a pool for `config.url`, choosing the driver from its scheme
    pub async fn connect(config: &DatabaseConfig) -> ModelResult<Self> {
        config.validate()?;
        let backend = config.backend_type()?;

        let driver: Arc<dyn DatabaseDriver> = match backend {
            DatabaseBackendType::SQLite => Arc::new(SqliteDriver::connect(config).await.map_err(|e| {
                error!("Failed to open SQLite pool: {}", e);
                e
            })?),
            DatabaseBackendType::MySQL => Arc::new(MySqlDriver::connect(config).await.map_err(|e| {
                error!("Failed to open MySQL pool: {}", e);
                e
            })?),
        };
        info!(
            backend = %backend,
            max_connections = config.max_connections,
            "database pool ready"
        );

        Ok(Self::new(driver).with_eager_max_depth(config.eager_max_depth))
    }

    /// Default recursion bound for eager loads that do not set their own
    pub fn with_eager_max_depth(mut self, depth: usize) -> Self {
        self.eager_max_depth = depth;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        match &self.handle {
            Handle::Pool(driver) => driver.dialect(),
            Handle::Transaction(connection) => connection.dialect(),
        }
    }

    pub fn registry(&self) -> &Arc<RelationRegistry> {
        &self.registry
    }

    pub fn eager_max_depth(&self) -> usize {
        self.eager_max_depth
    }

    /// True for the handle passed into a transaction callback
    pub fn is_transaction(&self) -> bool {
        matches!(self.handle, Handle::Transaction(_))
    }

    pub fn register_model(&self, config: ModelConfig) -> ModelResult<Arc<ModelConfig>> {
        let config = self.registry.register_model(config)?;
        debug!(model = %config.name, table = %config.table, "registered model");
        Ok(config)
    }

    pub fn register_relation(&self, entity: &str, name: &str, descriptor: RelationDescriptor) -> ModelResult<()> {
        self.registry.register_relation(entity, name, descriptor)
    }

    /// Register a typed model together with its declared relations
    pub fn register<M: Model>(&self) -> ModelResult<Arc<ModelConfig>> {
        let config = self.register_model(M::config()?)?;
        for (name, descriptor) in M::relations() {
            self.register_relation(&config.name, name, descriptor)?;
        }
        Ok(config)
    }

    /// Untyped builder for a registered entity
    pub fn model(&self, name: &str) -> ModelResult<QueryBuilder<Record>> {
        let config = self.registry.model(name)?;
        Ok(QueryBuilder::new(self.clone(), config))
    }

    /// Typed builder for a registered model
    pub fn query<M: Model>(&self) -> ModelResult<QueryBuilder<M>> {
        let config = self.registry.model(M::model_name())?;
        Ok(QueryBuilder::new(self.clone(), config))
    }

    /// Run a SELECT and convert every row into a [`Record`]
    pub async fn fetch_all(&self, sql: &str, params: Vec<DatabaseValue>) -> ModelResult<Vec<Record>> {
        let params = self.prepare(params)?;
        debug!(sql = %sql, params = params.len(), "query");

        let rows = match &self.handle {
            Handle::Pool(driver) => driver.query(sql, &params).await?,
            Handle::Transaction(connection) => connection.query(sql, &params).await?,
        };
        rows.iter().map(|row| Record::from_row(row.as_ref())).collect()
    }

    /// Run a write statement
    pub async fn execute(&self, sql: &str, params: Vec<DatabaseValue>) -> ModelResult<ExecuteResult> {
        let params = self.prepare(params)?;
        debug!(sql = %sql, params = params.len(), "execute");

        match &self.handle {
            Handle::Pool(driver) => driver.execute(sql, &params).await,
            Handle::Transaction(connection) => connection.execute(sql, &params).await,
        }
    }

    /// Close the underlying pool
    pub async fn close(&self) -> ModelResult<()> {
        match &self.handle {
            Handle::Pool(driver) => {
                driver.close().await?;
                info!("database pool closed");
                Ok(())
            }
            Handle::Transaction(_) => Err(ModelError::Configuration(
                "Cannot close the pool from inside a transaction".to_string(),
            )),
        }
    }

    pub(crate) fn driver(&self) -> ModelResult<&Arc<dyn DatabaseDriver>> {
        match &self.handle {
            Handle::Pool(driver) => Ok(driver),
            Handle::Transaction(_) => Err(ModelError::Configuration(
                "Nested transactions are not supported".to_string(),
            )),
        }
    }

    /// Same registry and settings, bound to one connection
    pub(crate) fn pinned(&self, connection: Arc<dyn DatabaseConnection>) -> Self {
        Self {
            handle: Handle::Transaction(connection),
            registry: Arc::clone(&self.registry),
            eager_max_depth: self.eager_max_depth,
        }
    }

    fn prepare(&self, params: Vec<DatabaseValue>) -> ModelResult<Vec<DatabaseValue>> {
        let dialect = self.dialect();
        params.into_iter().map(|value| dialect.prepare_value(value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockDriver;

    #[tokio::test]
    async fn test_params_are_prepared_for_dialect() {
        let driver = Arc::new(MockDriver::new());
        let db = Database::new(driver.clone());
        let id = uuid::Uuid::nil();

        db.execute("DELETE FROM t WHERE id = ?", vec![DatabaseValue::Uuid(id)])
            .await
            .unwrap();

        let statements = driver.statements();
        assert_eq!(statements[0].params, vec![DatabaseValue::String(id.to_string())]);
    }

    #[tokio::test]
    async fn test_model_requires_registration() {
        let db = Database::new(Arc::new(MockDriver::new()));
        assert!(db.model("Ghost").unwrap_err().is_configuration());

        db.register_model(ModelConfig::builder("Ghost", "ghosts").allowed_fields(["name"]).build().unwrap())
            .unwrap();
        assert!(db.model("Ghost").is_ok());
    }

    #[tokio::test]
    async fn test_close_inside_transaction_fails() {
        let db = Database::new(Arc::new(MockDriver::new()));
        let result = db
            .transaction(|tx| async move { tx.close().await })
            .await;
        assert!(result.unwrap_err().is_configuration());
    }
}
