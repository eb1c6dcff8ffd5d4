//! Insert, update, delete and soft-delete behaviour against the recording driver

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_orm::backends::{MockDriver, StatementKind};
use quarry_orm::{
    Database, DatabaseValue, Fields, ModelConfig, ModelError, ModelHooks, ModelResult, Record, WriteOperation,
};

fn fields(pairs: &[(&str, DatabaseValue)]) -> Fields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn setup(config: ModelConfig) -> (Database, Arc<MockDriver>) {
    let driver = Arc::new(MockDriver::new());
    let db = Database::new(driver.clone());
    db.register_model(config).unwrap();
    (db, driver)
}

fn users() -> ModelConfig {
    ModelConfig::builder("User", "users")
        .allowed_fields(["name", "email"])
        .build()
        .unwrap()
}

fn posts() -> ModelConfig {
    ModelConfig::builder("Post", "posts")
        .allowed_fields(["title"])
        .timestamps(true)
        .soft_deletes(true)
        .soft_delete_column("deleted_at")
        .build()
        .unwrap()
}

#[tokio::test]
async fn insert_filters_fields_and_returns_generated_id() {
    let (db, driver) = setup(users());

    let id = db
        .model("User")
        .unwrap()
        .insert(fields(&[("name", "ann".into()), ("is_admin", true.into())]))
        .await
        .unwrap();

    assert_eq!(id, DatabaseValue::Int64(1));
    let statements = driver.statements();
    assert_eq!(statements[0].sql, "INSERT INTO users (name) VALUES (?)");
    assert_eq!(statements[0].params, vec![DatabaseValue::from("ann")]);
}

#[tokio::test]
async fn insert_prefers_explicit_primary_key() {
    let (db, driver) = setup(users());

    let id = db
        .model("User")
        .unwrap()
        .insert(fields(&[("id", 77.into()), ("name", "bob".into())]))
        .await
        .unwrap();

    assert_eq!(id, DatabaseValue::Int32(77));
    assert_eq!(driver.executed(), vec!["INSERT INTO users (id, name) VALUES (?, ?)"]);
}

#[tokio::test]
async fn insert_with_no_writable_fields_fails_without_sql() {
    let (db, driver) = setup(users());

    let err = db
        .model("User")
        .unwrap()
        .insert(fields(&[("password", "x".into())]))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn timestamps_are_set_on_insert_and_update() {
    let (db, driver) = setup(posts());
    let mut query = db.model("Post").unwrap();

    query.insert(fields(&[("title", "hi".into())])).await.unwrap();
    query.update_by_id(1, fields(&[("title", "edited".into())])).await.unwrap();

    let statements = driver.statements();
    assert_eq!(
        statements[0].sql,
        "INSERT INTO posts (created_at, title, updated_at) VALUES (?, ?, ?)"
    );
    assert_eq!(statements[0].params[0], statements[0].params[2]);
    assert_eq!(statements[1].sql, "UPDATE posts SET title = ?, updated_at = ? WHERE id = ?");
    assert_eq!(statements[1].params[2], DatabaseValue::Int32(1));
}

#[tokio::test]
async fn update_and_delete_by_ids() {
    let (db, driver) = setup(users());
    let mut query = db.model("User").unwrap();

    let affected = query
        .update_by_ids([1, 2], fields(&[("email", "x@example.com".into())]))
        .await
        .unwrap();
    assert_eq!(affected, 1);
    query.delete_by_ids(vec![3, 4, 5]).await.unwrap();

    assert_eq!(
        driver.executed(),
        vec![
            "UPDATE users SET email = ? WHERE id IN (?, ?)",
            "DELETE FROM users WHERE id IN (?, ?, ?)",
        ]
    );
}

#[tokio::test]
async fn builder_scoped_writes_use_pending_conditions() {
    let (db, driver) = setup(users());
    let mut query = db.model("User").unwrap();

    query.where_eq("email", "old@example.com").update(fields(&[("name", "renamed".into())])).await.unwrap();
    query.where_like("email", "%@spam.test").delete().await.unwrap();

    let statements = driver.statements();
    assert_eq!(statements[0].sql, "UPDATE users SET name = ? WHERE email = ?");
    assert_eq!(statements[0].params, vec![DatabaseValue::from("renamed"), DatabaseValue::from("old@example.com")]);
    assert_eq!(statements[1].sql, "DELETE FROM users WHERE email LIKE ?");
}

#[tokio::test]
async fn updates_never_rewrite_the_primary_key() {
    let (db, driver) = setup(users());
    let mut query = db.model("User").unwrap();

    query
        .where_eq("name", "x")
        .update(fields(&[("id", 999.into()), ("name", "y".into())]))
        .await
        .unwrap();
    query.update_by_id(1, fields(&[("id", 2.into()), ("email", "a@b.c".into())])).await.unwrap();
    query.update_by_ids([1, 2], fields(&[("id", 3.into()), ("email", "d@e.f".into())])).await.unwrap();

    let err = query.update_by_id(1, fields(&[("id", 5.into())])).await.unwrap_err();
    assert!(err.is_validation());

    assert_eq!(
        driver.executed(),
        vec![
            "UPDATE users SET name = ? WHERE name = ?",
            "UPDATE users SET email = ? WHERE id = ?",
            "UPDATE users SET email = ? WHERE id IN (?, ?)",
        ]
    );
    assert!(driver.executed().iter().all(|sql| !sql.contains("SET id")));
}

#[tokio::test]
async fn writes_without_where_clause_are_refused() {
    let (db, driver) = setup(users());
    let mut query = db.model("User").unwrap();

    let err = query.update(fields(&[("name", "everyone".into())])).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("entire"));

    assert!(query.delete().await.unwrap_err().is_validation());

    // An empty IN list compiles to nothing, so it cannot scope a delete
    query.where_in("id", Vec::<i64>::new());
    assert!(query.delete().await.unwrap_err().is_validation());

    assert!(query.delete_by_ids(Vec::<i64>::new()).await.unwrap_err().is_validation());
    assert!(query.delete_by_id(DatabaseValue::Null).await.unwrap_err().is_validation());

    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn soft_delete_requires_the_feature() {
    let (db, driver) = setup(users());
    let mut query = db.model("User").unwrap();

    assert!(query.soft_delete_by_id(1).await.unwrap_err().is_configuration());
    query.where_eq("name", "ann");
    assert!(query.soft_delete().await.unwrap_err().is_configuration());
    assert!(query.restore_by_id(1).await.unwrap_err().is_configuration());

    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn soft_delete_without_column_is_a_configuration_error() {
    let config = ModelConfig::builder("Draft", "drafts")
        .allowed_fields(["body"])
        .soft_deletes(true)
        .build()
        .unwrap();
    let (db, driver) = setup(config);

    let err = db.model("Draft").unwrap().soft_delete_by_id(1).await.unwrap_err();
    assert!(matches!(err, ModelError::Configuration(_)));
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn soft_delete_restore_and_trashed_filter() {
    let (db, driver) = setup(posts());
    let mut query = db.model("Post").unwrap();

    query.soft_delete_by_id(3).await.unwrap();
    query.restore_by_id(3).await.unwrap();
    query.only_trashed().get().await.unwrap();
    query.without_trashed().count().await.unwrap();

    let statements = driver.statements();
    assert_eq!(statements[0].sql, "UPDATE posts SET deleted_at = ?, updated_at = ? WHERE id = ?");
    assert!(matches!(statements[0].params[0], DatabaseValue::String(_)));
    assert_eq!(statements[0].params[0], statements[0].params[1]);
    assert_eq!(statements[1].sql, "UPDATE posts SET deleted_at = ?, updated_at = ? WHERE id = ?");
    assert_eq!(statements[1].params[0], DatabaseValue::Null);
    assert!(matches!(statements[1].params[1], DatabaseValue::String(_)));
    assert_eq!(statements[2].sql, "SELECT * FROM posts WHERE deleted_at IS NOT NULL");
    assert_eq!(statements[3].sql, "SELECT COUNT(*) AS count FROM posts WHERE deleted_at IS NULL");
}

#[derive(Default)]
struct RecordingHooks {
    calls: Mutex<Vec<String>>,
    reject: bool,
}

impl RecordingHooks {
    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelHooks for RecordingHooks {
    async fn validate(&self, data: &Fields, operation: WriteOperation) -> ModelResult<()> {
        self.push(format!("validate:{:?}", operation));
        if self.reject && !data.contains_key("email") {
            return Err(ModelError::Validation("email is required".to_string()));
        }
        Ok(())
    }

    async fn before_create(&self, data: &mut Fields) -> ModelResult<()> {
        self.push("before_create");
        data.insert("email".to_string(), "default@example.com".into());
        Ok(())
    }

    async fn after_create(&self, id: &DatabaseValue, _data: &Fields) -> ModelResult<()> {
        self.push(format!("after_create:{:?}", id));
        Ok(())
    }

    async fn before_update(&self, _data: &mut Fields) -> ModelResult<()> {
        self.push("before_update");
        Ok(())
    }

    async fn after_update(&self, _data: &Fields, affected: u64) -> ModelResult<()> {
        self.push(format!("after_update:{}", affected));
        Ok(())
    }

    async fn before_delete(&self) -> ModelResult<()> {
        self.push("before_delete");
        Ok(())
    }

    async fn after_delete(&self, affected: u64) -> ModelResult<()> {
        self.push(format!("after_delete:{}", affected));
        Ok(())
    }
}

fn hooked_users(hooks: Arc<RecordingHooks>) -> ModelConfig {
    ModelConfig::builder("User", "users")
        .allowed_fields(["name", "email"])
        .hooks(hooks)
        .build()
        .unwrap()
}

#[tokio::test]
async fn hooks_run_in_order_around_writes() {
    let hooks = Arc::new(RecordingHooks::default());
    let (db, driver) = setup(hooked_users(hooks.clone()));
    let mut query = db.model("User").unwrap();

    query.insert(fields(&[("name", "ann".into())])).await.unwrap();
    query.update_by_id(1, fields(&[("name", "anna".into())])).await.unwrap();
    query.delete_by_id(1).await.unwrap();

    assert_eq!(
        hooks.calls(),
        vec![
            "validate:Create",
            "before_create",
            "after_create:Int64(1)",
            "validate:Update",
            "before_update",
            "after_update:1",
            "before_delete",
            "after_delete:1",
        ]
    );
    // before_create may add fields
    assert_eq!(driver.executed()[0], "INSERT INTO users (email, name) VALUES (?, ?)");
}

#[tokio::test]
async fn soft_delete_and_restore_run_the_write_hooks() {
    let hooks = Arc::new(RecordingHooks::default());
    let config = ModelConfig::builder("Post", "posts")
        .allowed_fields(["title"])
        .soft_deletes(true)
        .soft_delete_column("deleted_at")
        .hooks(hooks.clone())
        .build()
        .unwrap();
    let (db, driver) = setup(config);
    let mut query = db.model("Post").unwrap();

    query.soft_delete_by_id(4).await.unwrap();
    query.restore_by_id(4).await.unwrap();

    assert_eq!(
        hooks.calls(),
        vec!["before_delete", "after_delete:1", "validate:Update", "before_update", "after_update:1"]
    );
    assert_eq!(
        driver.executed(),
        vec!["UPDATE posts SET deleted_at = ? WHERE id = ?", "UPDATE posts SET deleted_at = ? WHERE id = ?"]
    );
}

#[tokio::test]
async fn failing_validation_aborts_before_sql() {
    let hooks = Arc::new(RecordingHooks { reject: true, ..Default::default() });
    let (db, driver) = setup(hooked_users(hooks.clone()));

    let err = db
        .model("User")
        .unwrap()
        .insert(fields(&[("name", "ann".into())]))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(hooks.calls(), vec!["validate:Create"]);
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn transaction_rolls_back_on_error_and_releases() {
    let (db, driver) = setup(users());

    let result: ModelResult<()> = db
        .transaction(|tx| async move {
            tx.model("User")?.insert(fields(&[("name", "ann".into())])).await?;
            Err(ModelError::Validation("abort".to_string()))
        })
        .await;
    assert!(result.is_err());

    let log: Vec<(StatementKind, String)> = driver.statements().into_iter().map(|s| (s.kind, s.sql)).collect();
    assert_eq!(
        log,
        vec![
            (StatementKind::Transaction, "BEGIN".to_string()),
            (StatementKind::Execute, "INSERT INTO users (name) VALUES (?)".to_string()),
            (StatementKind::Transaction, "ROLLBACK".to_string()),
            (StatementKind::Transaction, "RELEASE".to_string()),
        ]
    );
}

#[tokio::test]
async fn transaction_commits_and_returns_value() {
    let (db, driver) = setup(users());

    let id = db
        .transaction(|tx| async move {
            let mut users = tx.model("User")?;
            let id = users.insert(fields(&[("name", "ann".into())])).await?;
            users.update_by_id(id.clone(), fields(&[("email", "ann@example.com".into())])).await?;
            Ok(id)
        })
        .await
        .unwrap();

    assert_eq!(id, DatabaseValue::Int64(1));
    let kinds: Vec<String> = driver
        .statements()
        .into_iter()
        .filter(|s| s.kind == StatementKind::Transaction)
        .map(|s| s.sql)
        .collect();
    assert_eq!(kinds, vec!["BEGIN", "COMMIT", "RELEASE"]);
}

#[tokio::test]
async fn records_round_trip_through_typed_payloads() {
    let record = Record::new().with("name", "ann").with("email", "ann@example.com");
    let (db, driver) = setup(users());

    db.model("User").unwrap().insert(record.into_fields()).await.unwrap();
    assert_eq!(driver.executed(), vec!["INSERT INTO users (email, name) VALUES (?, ?)"]);
}
