//! End-to-end checks against an in-memory SQLite database

use quarry_orm::{
    Database, DatabaseConfig, DatabaseValue, EagerLoadOptions, Fields, ModelConfig, ModelError, OrderDirection,
    RelationDescriptor,
};

fn fields(pairs: &[(&str, DatabaseValue)]) -> Fields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// One pinned connection so every statement sees the same memory database
async fn connect() -> Database {
    let config = DatabaseConfig::new("sqlite::memory:")
        .with_max_connections(1)
        .with_idle_timeout(None)
        .with_max_lifetime(None);
    let db = Database::connect(&config).await.unwrap();

    for ddl in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, status TEXT, \
         created_at TEXT, updated_at TEXT)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER, title TEXT, deleted_at TEXT)",
        "CREATE TABLE comments (id INTEGER PRIMARY KEY AUTOINCREMENT, post_id INTEGER, body TEXT)",
    ] {
        db.execute(ddl, vec![]).await.unwrap();
    }

    db.register_model(
        ModelConfig::builder("User", "users")
            .allowed_fields(["name", "status"])
            .timestamps(true)
            .build()
            .unwrap(),
    )
    .unwrap();
    db.register_model(
        ModelConfig::builder("Post", "posts")
            .allowed_fields(["user_id", "title"])
            .soft_deletes(true)
            .soft_delete_column("deleted_at")
            .build()
            .unwrap(),
    )
    .unwrap();
    db.register_model(
        ModelConfig::builder("Comment", "comments")
            .allowed_fields(["post_id", "body"])
            .build()
            .unwrap(),
    )
    .unwrap();

    db.register_relation("User", "posts", RelationDescriptor::has_many("Post")).unwrap();
    db.register_relation("Post", "author", RelationDescriptor::belongs_to("User").foreign_key("user_id"))
        .unwrap();
    db.register_relation("Post", "comments", RelationDescriptor::has_many("Comment")).unwrap();
    db
}

async fn seed(db: &Database) {
    let mut users = db.model("User").unwrap();
    let mut posts = db.model("Post").unwrap();
    let mut comments = db.model("Comment").unwrap();

    for (name, status) in [("ann", "active"), ("bob", "active"), ("cy", "banned")] {
        users
            .insert(fields(&[("name", name.into()), ("status", status.into())]))
            .await
            .unwrap();
    }
    for (user_id, title) in [(1, "first"), (1, "second"), (2, "third")] {
        let post_id = posts
            .insert(fields(&[("user_id", user_id.into()), ("title", title.into())]))
            .await
            .unwrap();
        comments
            .insert(fields(&[("post_id", post_id), ("body", "nice".into())]))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn insert_returns_rowid_and_sets_timestamps() {
    let db = connect().await;

    let id = db
        .model("User")
        .unwrap()
        .insert(fields(&[("name", "ann".into()), ("role", "admin".into())]))
        .await
        .unwrap();
    assert_eq!(id, DatabaseValue::Int64(1));

    let user = db.model("User").unwrap().find(1).await.unwrap().unwrap();
    assert_eq!(user.get("name"), Some(&DatabaseValue::from("ann")));
    assert!(matches!(user.get("created_at"), Some(DatabaseValue::String(_))));
    assert_eq!(user.get("created_at"), user.get("updated_at"));
}

#[tokio::test]
async fn filters_ordering_and_pagination() {
    let db = connect().await;
    seed(&db).await;

    let active = db
        .model("User")
        .unwrap()
        .where_eq("status", "active")
        .order_by("name", OrderDirection::Desc)
        .get()
        .await
        .unwrap();
    let names: Vec<_> = active.iter().filter_map(|u| u.get("name").cloned()).collect();
    assert_eq!(names, vec![DatabaseValue::from("bob"), DatabaseValue::from("ann")]);

    let page = db.model("User").unwrap().order_by("id", OrderDirection::Asc).paginate(2, 2).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.last_page, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].get("name"), Some(&DatabaseValue::from("cy")));

    let total = db.model("Post").unwrap().select_sum("user_id", "total").get().await.unwrap();
    assert_eq!(total[0].get("total"), Some(&DatabaseValue::Int64(4)));
}

#[tokio::test]
async fn nested_eager_loading_against_real_rows() {
    let db = connect().await;
    seed(&db).await;

    let users = db
        .model("User")
        .unwrap()
        .order_by("id", OrderDirection::Asc)
        .with(["posts.comments", "posts.author"])
        .get()
        .await
        .unwrap();

    assert_eq!(users[0].related_many("posts").len(), 2);
    assert_eq!(users[1].related_many("posts").len(), 1);
    assert!(users[2].related_many("posts").is_empty());

    let post = &users[0].related_many("posts")[0];
    assert_eq!(post.related_many("comments").len(), 1);
    assert_eq!(post.related_one("author").and_then(|a| a.key("id")), users[0].key("id"));

    let constrained = db
        .model("User")
        .unwrap()
        .where_eq("id", 1)
        .with_options(
            ["posts"],
            EagerLoadOptions::new().constrain("posts", |q| {
                q.where_eq("title", "second");
            }),
        )
        .get()
        .await
        .unwrap();
    assert_eq!(constrained[0].related_many("posts").len(), 1);
}

#[tokio::test]
async fn soft_delete_and_restore() {
    let db = connect().await;
    seed(&db).await;
    let mut posts = db.model("Post").unwrap();

    assert_eq!(posts.soft_delete_by_id(2).await.unwrap(), 1);
    assert_eq!(posts.without_trashed().count().await.unwrap(), 2);
    assert_eq!(posts.only_trashed().count().await.unwrap(), 1);
    // No default scope: plain reads still see trashed rows
    assert_eq!(posts.count().await.unwrap(), 3);

    posts.restore_by_id(2).await.unwrap();
    assert_eq!(posts.only_trashed().count().await.unwrap(), 0);
}

#[tokio::test]
async fn update_and_delete_affect_matched_rows() {
    let db = connect().await;
    seed(&db).await;
    let mut users = db.model("User").unwrap();

    let affected = users
        .where_eq("status", "active")
        .update(fields(&[("status", "dormant".into())]))
        .await
        .unwrap();
    assert_eq!(affected, 2);

    assert_eq!(users.delete_by_ids([1, 3]).await.unwrap(), 2);
    let left = users.get().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].get("status"), Some(&DatabaseValue::from("dormant")));
}

#[tokio::test]
async fn transaction_commit_and_rollback() {
    let db = connect().await;

    db.transaction(|tx| async move {
        tx.model("User")?.insert(fields(&[("name", "kept".into())])).await?;
        Ok(())
    })
    .await
    .unwrap();

    let result: Result<(), ModelError> = db
        .transaction(|tx| async move {
            tx.model("User")?.insert(fields(&[("name", "discarded".into())])).await?;
            Err(ModelError::Validation("stop".to_string()))
        })
        .await;
    assert!(result.is_err());

    let users = db.model("User").unwrap().get().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get("name"), Some(&DatabaseValue::from("kept")));
}
