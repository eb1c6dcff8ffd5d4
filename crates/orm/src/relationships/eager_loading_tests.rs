//! Tests for batched eager loading against the recording driver

use std::sync::Arc;

use crate::backends::{DatabaseValue, MockDriver};
use crate::database::Database;
use crate::model::{ModelConfig, Record, RelationValue};
use crate::relationships::{EagerLoadOptions, RelationDescriptor};

fn user(id: i64) -> Record {
    Record::new().with("id", id).with("name", format!("user{}", id))
}

fn post(id: i64, user_id: i64) -> Record {
    Record::new().with("id", id).with("user_id", user_id).with("title", format!("post{}", id))
}

fn comment(id: i64, post_id: i64, approved: bool) -> Record {
    Record::new()
        .with("id", id)
        .with("post_id", post_id)
        .with("approved", approved)
}

fn blog_fixtures() -> MockDriver {
    // 3 users with 2 posts each, 2 comments per post (one approved)
    let users = (1..=3).map(user).collect();
    let posts = (1..=6).map(|id| post(id, (id + 1) / 2)).collect();
    let comments = (1..=12).map(|id| comment(id, (id + 1) / 2, id % 2 == 0)).collect();

    MockDriver::new()
        .with_table("users", users)
        .with_table("posts", posts)
        .with_table("comments", comments)
        .with_table("profiles", vec![Record::new().with("id", 1).with("user_id", 1).with("bio", "hi")])
        .with_table("tags", vec![Record::new().with("id", 1).with("label", "rust")])
        .with_table(
            "post_tag",
            vec![
                Record::new().with("post_id", 1).with("tag_id", 1),
                Record::new().with("post_id", 1).with("tag_id", 1),
                Record::new().with("post_id", 2).with("tag_id", 99),
            ],
        )
}

fn blog_database(driver: MockDriver) -> (Database, Arc<MockDriver>) {
    let driver = Arc::new(driver);
    let db = Database::new(driver.clone());

    let models = [
        ("User", "users", vec!["name"]),
        ("Post", "posts", vec!["title", "user_id"]),
        ("Comment", "comments", vec!["post_id", "approved", "body"]),
        ("Profile", "profiles", vec!["user_id", "bio"]),
        ("Tag", "tags", vec!["label"]),
    ];
    for (name, table, fields) in models {
        db.register_model(ModelConfig::builder(name, table).allowed_fields(fields).build().unwrap())
            .unwrap();
    }

    db.register_relation("User", "posts", RelationDescriptor::has_many("Post")).unwrap();
    db.register_relation("User", "profile", RelationDescriptor::has_one("Profile")).unwrap();
    db.register_relation("Post", "author", RelationDescriptor::belongs_to("User").foreign_key("user_id"))
        .unwrap();
    db.register_relation("Post", "comments", RelationDescriptor::has_many("Comment")).unwrap();
    db.register_relation("Post", "tags", RelationDescriptor::belongs_to_many("Tag")).unwrap();
    db.register_relation("Comment", "post", RelationDescriptor::belongs_to("Post")).unwrap();

    (db, driver)
}

#[tokio::test]
async fn test_has_many_for_hundred_parents_is_one_query() {
    let users = (1..=100).map(user).collect();
    let posts = vec![post(1, 7), post(2, 7), post(3, 42)];
    let (db, driver) = blog_database(MockDriver::new().with_table("users", users).with_table("posts", posts));

    let users = db.model("User").unwrap().with(["posts"]).get().await.unwrap();

    assert_eq!(users.len(), 100);
    assert_eq!(driver.query_count(), 2);
    assert_eq!(users[6].related_many("posts").len(), 2);
    assert_eq!(users[41].related_many("posts").len(), 1);
    assert_eq!(users[0].relation("posts"), Some(&RelationValue::Many(vec![])));

    let queries = driver.queries();
    assert!(queries[1].starts_with("SELECT * FROM posts WHERE user_id IN (?, ?, ?"));
}

#[tokio::test]
async fn test_nested_path_issues_one_query_per_level() {
    let (db, driver) = blog_database(blog_fixtures());

    let users = db.model("User").unwrap().with(["posts.comments"]).get().await.unwrap();

    assert_eq!(driver.query_count(), 3);
    let queries = driver.queries();
    assert_eq!(queries[0], "SELECT * FROM users");
    assert_eq!(queries[1], "SELECT * FROM posts WHERE user_id IN (?, ?, ?)");
    assert_eq!(queries[2], "SELECT * FROM comments WHERE post_id IN (?, ?, ?, ?, ?, ?)");

    for user in &users {
        let posts = user.related_many("posts");
        assert_eq!(posts.len(), 2);
        for post in posts {
            let comments = post.related_many("comments");
            assert_eq!(comments.len(), 2);
            assert!(comments.iter().all(|c| c.get("post_id") == post.get("id")));
        }
    }
}

#[tokio::test]
async fn test_shared_prefix_is_loaded_once() {
    let (db, driver) = blog_database(blog_fixtures());

    db.model("User")
        .unwrap()
        .with(["posts", "posts.comments", "profile"])
        .get()
        .await
        .unwrap();

    // users, posts, comments, profiles
    assert_eq!(driver.query_count(), 4);
}

#[tokio::test]
async fn test_singular_relations() {
    let (db, _driver) = blog_database(blog_fixtures());

    let users = db.model("User").unwrap().with(["profile"]).get().await.unwrap();
    assert_eq!(users[0].related_one("profile").and_then(|p| p.get("bio")), Some(&DatabaseValue::from("hi")));
    assert_eq!(users[1].relation("profile"), Some(&RelationValue::One(None)));

    let comments = db.model("Comment").unwrap().where_eq("post_id", 3).with(["post"]).get().await.unwrap();
    assert_eq!(comments.len(), 2);
    for comment in &comments {
        let post = comment.related_one("post").unwrap();
        assert_eq!(post.key("id"), comment.key("post_id"));
    }
}

#[tokio::test]
async fn test_belongs_to_skips_null_foreign_keys() {
    let posts = vec![
        Record::new().with("id", 1).with("user_id", DatabaseValue::Null),
        Record::new().with("id", 2).with("user_id", DatabaseValue::Null),
    ];
    let (db, driver) = blog_database(MockDriver::new().with_table("posts", posts));

    let posts = db.model("Post").unwrap().with(["author"]).get().await.unwrap();

    assert_eq!(driver.query_count(), 1);
    assert!(posts.iter().all(|p| p.relation("author") == Some(&RelationValue::One(None))));
}

#[tokio::test]
async fn test_belongs_to_many_drops_dangling_ids() {
    let (db, driver) = blog_database(blog_fixtures());

    let posts = db
        .model("Post")
        .unwrap()
        .where_in("id", [1, 2, 3])
        .with(["tags"])
        .get()
        .await
        .unwrap();

    let queries = driver.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[1], "SELECT post_id, tag_id FROM post_tag WHERE post_id IN (?, ?, ?)");
    assert_eq!(queries[2], "SELECT * FROM tags WHERE id IN (?, ?)");

    // Duplicate pivot rows collapse to one tag
    assert_eq!(posts[0].related_many("tags").len(), 1);
    // Pivot row points at a deleted tag
    assert_eq!(posts[1].relation("tags"), Some(&RelationValue::Many(vec![])));
    // No pivot rows at all
    assert!(posts[2].related_many("tags").is_empty());
}

#[tokio::test]
async fn test_constraint_applies_to_full_path() {
    let (db, driver) = blog_database(blog_fixtures());

    let options = EagerLoadOptions::new().constrain("posts.comments", |q| {
        q.where_eq("approved", true);
    });
    let users = db
        .model("User")
        .unwrap()
        .where_eq("id", 1)
        .with_options(["posts.comments"], options)
        .get()
        .await
        .unwrap();

    let queries = driver.queries();
    assert_eq!(queries[2], "SELECT * FROM comments WHERE post_id IN (?, ?) AND approved = ?");
    for post in users[0].related_many("posts") {
        let comments = post.related_many("comments");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].get("approved"), Some(&DatabaseValue::Bool(true)));
    }
}

#[tokio::test]
async fn test_max_depth_bounds_recursion() {
    let (db, driver) = blog_database(blog_fixtures());

    let users = db
        .model("User")
        .unwrap()
        .with_options(["posts.comments"], EagerLoadOptions::new().max_depth(1))
        .get()
        .await
        .unwrap();

    assert_eq!(driver.query_count(), 2);
    let post = &users[0].related_many("posts")[0];
    assert!(post.relation("comments").is_none());
}

#[tokio::test]
async fn test_database_default_depth_applies() {
    let (db, driver) = blog_database(blog_fixtures());
    let db = db.with_eager_max_depth(0);

    let users = db.model("User").unwrap().with(["posts"]).get().await.unwrap();

    assert_eq!(driver.query_count(), 1);
    assert!(users[0].relation("posts").is_none());
}

#[tokio::test]
async fn test_cycle_guard_stops_repeated_batch() {
    let (db, driver) = blog_database(blog_fixtures());

    let users = db
        .model("User")
        .unwrap()
        .with(["posts.author.posts"])
        .get()
        .await
        .unwrap();

    // users, posts, authors; the authors' posts batch repeats the first one
    assert_eq!(driver.query_count(), 3);
    let author = users[0].related_many("posts")[0].related_one("author").unwrap();
    assert_eq!(author.key("id"), users[0].key("id"));
    assert!(author.relation("posts").is_none());
}

#[tokio::test]
async fn test_unknown_relation_fails_before_any_query() {
    let (db, driver) = blog_database(blog_fixtures());

    let err = db
        .model("User")
        .unwrap()
        .with(["posts.reactions"])
        .get()
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(driver.query_count(), 0);
}

#[tokio::test]
async fn test_empty_parent_batch_issues_no_relation_query() {
    let (db, driver) = blog_database(MockDriver::new());

    let users = db.model("User").unwrap().with(["posts.comments"]).get().await.unwrap();

    assert!(users.is_empty());
    assert_eq!(driver.query_count(), 1);
}

#[tokio::test]
async fn test_eager_request_is_consumed_by_one_fetch() {
    let (db, driver) = blog_database(blog_fixtures());
    let mut query = db.model("User").unwrap();

    query.with(["posts"]).get().await.unwrap();
    let users = query.get().await.unwrap();

    assert_eq!(driver.query_count(), 3);
    assert!(users[0].relation("posts").is_none());
}
