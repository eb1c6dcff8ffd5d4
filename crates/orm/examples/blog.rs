//! Blog walkthrough on an in-memory SQLite database
//!
//! Run with `RUST_LOG=quarry_orm=debug cargo run --example blog` to see
//! every statement the builder and the eager loader issue.

use quarry_orm::{
    Database, DatabaseConfig, EagerLoadOptions, Model, ModelError, ModelResult, OrderDirection, RelationDescriptor,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    name: String,
    #[serde(default, skip_serializing)]
    posts: Vec<Post>,
}

impl Model for User {
    fn model_name() -> &'static str {
        "User"
    }

    fn table_name() -> &'static str {
        "users"
    }

    fn allowed_fields() -> &'static [&'static str] {
        &["name"]
    }

    fn uses_timestamps() -> bool {
        true
    }

    fn relations() -> Vec<(&'static str, RelationDescriptor)> {
        vec![("posts", RelationDescriptor::has_many("Post"))]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Post {
    id: Option<i64>,
    user_id: i64,
    title: String,
    #[serde(default, skip_serializing)]
    comments: Vec<Comment>,
}

impl Model for Post {
    fn model_name() -> &'static str {
        "Post"
    }

    fn table_name() -> &'static str {
        "posts"
    }

    fn allowed_fields() -> &'static [&'static str] {
        &["user_id", "title"]
    }

    fn uses_soft_deletes() -> bool {
        true
    }

    fn relations() -> Vec<(&'static str, RelationDescriptor)> {
        vec![
            ("author", RelationDescriptor::belongs_to("User").foreign_key("user_id")),
            ("comments", RelationDescriptor::has_many("Comment")),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Comment {
    id: Option<i64>,
    post_id: i64,
    body: String,
    // SQLite hands booleans back as integers
    approved: i64,
}

impl Model for Comment {
    fn model_name() -> &'static str {
        "Comment"
    }

    fn table_name() -> &'static str {
        "comments"
    }

    fn allowed_fields() -> &'static [&'static str] {
        &["post_id", "body", "approved"]
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, created_at TEXT, updated_at TEXT)",
    "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER NOT NULL, title TEXT NOT NULL, \
     deleted_at TEXT)",
    "CREATE TABLE comments (id INTEGER PRIMARY KEY AUTOINCREMENT, post_id INTEGER NOT NULL, body TEXT NOT NULL, \
     approved INTEGER NOT NULL DEFAULT 0)",
];

async fn seed(db: &Database) -> ModelResult<()> {
    db.transaction(|tx| async move {
        let mut users = tx.query::<User>()?;
        let mut posts = tx.query::<Post>()?;
        let mut comments = tx.query::<Comment>()?;

        for name in ["ada", "grace", "linus"] {
            let user_id = users.create(&User { id: None, name: name.to_string(), posts: vec![] }).await?;
            let user_id = user_id
                .as_i64()
                .ok_or_else(|| ModelError::Serialization("non-integer user id".to_string()))?;

            for n in 1..=2 {
                let post = Post { id: None, user_id, title: format!("{} #{}", name, n), comments: vec![] };
                let post_id = posts.create(&post).await?;
                let post_id = post_id
                    .as_i64()
                    .ok_or_else(|| ModelError::Serialization("non-integer post id".to_string()))?;

                for approved in [1, 0] {
                    let comment = Comment { id: None, post_id, body: "great read".to_string(), approved };
                    comments.create(&comment).await?;
                }
            }
        }
        Ok(())
    })
    .await
}

#[tokio::main]
async fn main() -> ModelResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DatabaseConfig::new("sqlite::memory:")
        .with_max_connections(1)
        .with_idle_timeout(None)
        .with_max_lifetime(None);
    let db = Database::connect(&config).await?;
    for ddl in SCHEMA {
        db.execute(ddl, vec![]).await?;
    }

    db.register::<User>()?;
    db.register::<Post>()?;
    db.register::<Comment>()?;
    seed(&db).await?;

    // Three queries in total, however many users come back
    let options = EagerLoadOptions::new().constrain("posts.comments", |q| {
        q.where_eq("approved", 1);
    });
    let users = db
        .query::<User>()?
        .order_by("name", OrderDirection::Asc)
        .with_options(["posts.comments"], options)
        .get()
        .await?;

    for user in &users {
        println!("{}", user.name);
        for post in &user.posts {
            println!("  {} ({} approved comments)", post.title, post.comments.len());
        }
    }

    let mut posts = db.query::<Post>()?;
    posts.where_like("title", "linus%").soft_delete().await?;
    let page = posts.without_trashed().order_by_desc("id").paginate(2, 1).await?;
    println!(
        "page {}/{} of {} live posts: {:?}",
        page.current_page,
        page.last_page,
        page.total,
        page.data.iter().map(|p| p.title.as_str()).collect::<Vec<_>>()
    );

    db.close().await
}
