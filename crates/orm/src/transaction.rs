//! Transaction Management
//!
//! Scoped transactions on one pooled connection: the callback gets a
//! [`Database`] pinned to that connection, the transaction commits when the
//! callback returns `Ok` and rolls back otherwise, and the connection is
//! released on every path.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backends::DatabaseConnection;
use crate::database::Database;
use crate::error::{ModelError, ModelResult};

impl Database {
    /// Run `f` inside a transaction.
    ///
    /// Builders created from the handle passed to `f` run on the
    /// transaction's connection. Calling this on that handle again is an
    /// error; nested transactions are not supported.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> ModelResult<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        let driver = self.driver()?;
        let connection = driver.acquire().await?;

        if let Err(e) = connection.begin_transaction().await {
            release(&connection).await;
            return Err(ModelError::Transaction(format!("Failed to begin transaction: {}", e)));
        }
        debug!("Transaction started");

        let result = f(self.pinned(Arc::clone(&connection))).await;
        let outcome = match result {
            Ok(value) => match connection.commit().await {
                Ok(()) => {
                    debug!("Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rollback_err) = connection.rollback().await {
                        warn!("Rollback after failed commit also failed: {}", rollback_err);
                    }
                    Err(ModelError::Transaction(format!("Failed to commit transaction: {}", e)))
                }
            },
            Err(e) => {
                debug!("Rolling back transaction: {}", e);
                if let Err(rollback_err) = connection.rollback().await {
                    warn!("Failed to roll back transaction: {}", rollback_err);
                }
                Err(e)
            }
        };

        release(&connection).await;
        outcome
    }
}

/// Execute a closure within a transaction scope with automatic commit/rollback
pub async fn with_transaction<F, Fut, T>(db: &Database, f: F) -> ModelResult<T>
where
    F: FnOnce(Database) -> Fut,
    Fut: Future<Output = ModelResult<T>>,
{
    db.transaction(f).await
}

async fn release(connection: &Arc<dyn DatabaseConnection>) {
    if let Err(e) = connection.release().await {
        warn!("Failed to release transaction connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockDriver, StatementKind};

    fn transaction_log(driver: &MockDriver) -> Vec<String> {
        driver
            .statements()
            .into_iter()
            .filter(|s| s.kind == StatementKind::Transaction)
            .map(|s| s.sql)
            .collect()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let driver = Arc::new(MockDriver::new());
        let db = Database::new(driver.clone());

        let value = db
            .transaction(|tx| async move {
                assert!(tx.is_transaction());
                tx.execute("UPDATE accounts SET balance = ? WHERE id = ?", vec![10.into(), 1.into()])
                    .await?;
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(transaction_log(&driver), vec!["BEGIN", "COMMIT", "RELEASE"]);
    }

    #[tokio::test]
    async fn test_rollback_on_error() {
        let driver = Arc::new(MockDriver::new());
        let db = Database::new(driver.clone());

        let result: ModelResult<()> =
            with_transaction(&db, |_tx| async move { Err(ModelError::Validation("boom".to_string())) }).await;

        assert!(result.unwrap_err().is_validation());
        assert_eq!(transaction_log(&driver), vec!["BEGIN", "ROLLBACK", "RELEASE"]);
    }

    #[tokio::test]
    async fn test_nested_transaction_rejected() {
        let driver = Arc::new(MockDriver::new());
        let db = Database::new(driver.clone());

        let result = db
            .transaction(|tx| async move { tx.transaction(|_inner| async move { Ok(()) }).await })
            .await;

        assert!(result.unwrap_err().is_configuration());
        assert_eq!(transaction_log(&driver), vec!["BEGIN", "ROLLBACK", "RELEASE"]);
    }
}
