//! Shared fixture: authors, articles, tags and posts held in memory

#![allow(dead_code)]

use std::sync::Arc;

use elif_eager::{
    AssociationOptions, Collection, EngineConfig, FieldType, MemoryExecutor, QueryEngine, Registry,
};
use serde_json::{json, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn text_fields() -> Vec<(&'static str, FieldType)> {
    vec![
        ("id", FieldType::Integer),
        ("author_id", FieldType::Integer),
        ("title", FieldType::String),
        ("body", FieldType::String),
        ("published", FieldType::String),
    ]
}

/// Collections only; associations are declared per test
pub fn registry() -> Registry {
    let registry = Registry::new();
    registry
        .register(
            Collection::new("author")
                .table("authors")
                .fields([("id", FieldType::Integer), ("name", FieldType::String)]),
        )
        .unwrap();
    registry
        .register(Collection::new("article").table("articles").fields(text_fields()))
        .unwrap();
    registry
        .register(Collection::new("post").table("posts").fields(text_fields()))
        .unwrap();
    registry
        .register(
            Collection::new("Tag")
                .table("tags")
                .fields([("id", FieldType::Integer), ("name", FieldType::String)]),
        )
        .unwrap();
    registry
        .register(Collection::new("ArticlesTag").table("articles_tags"))
        .unwrap();
    registry
}

/// Registry with the usual associations, `author.article` using `strategy`
pub fn associated_registry(strategy: &str) -> Registry {
    let registry = registry();
    registry
        .has_many(
            "author",
            "article",
            AssociationOptions::from_value(json!({
                "property": "articles",
                "strategy": strategy,
                "sort": {"article.id": "asc"}
            }))
            .unwrap(),
        )
        .unwrap();
    registry
        .belongs_to("article", "author", AssociationOptions::new())
        .unwrap();
    registry
        .belongs_to_many(
            "article",
            "Tag",
            AssociationOptions::from_value(json!({"property": "tags", "strategy": strategy})).unwrap(),
        )
        .unwrap();
    registry
        .has_many("author", "post", AssociationOptions::new().property("posts"))
        .unwrap();
    registry
}

fn body(title: &str) -> String {
    format!("{} Body", title)
}

fn text_row(id: i64, author_id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "author_id": author_id,
        "title": title,
        "body": body(title),
        "published": "Y"
    })
}

pub fn article(id: i64, author_id: i64, title: &str) -> Value {
    text_row(id, author_id, title)
}

pub fn executor() -> MemoryExecutor {
    let executor = MemoryExecutor::new();
    executor.seed(
        "authors",
        vec![
            json!({"id": 1, "name": "mariano"}),
            json!({"id": 2, "name": "nate"}),
            json!({"id": 3, "name": "larry"}),
            json!({"id": 4, "name": "garrett"}),
        ],
    );
    executor.seed(
        "articles",
        vec![
            text_row(1, 1, "First Article"),
            text_row(2, 3, "Second Article"),
            text_row(3, 1, "Third Article"),
        ],
    );
    executor.seed(
        "tags",
        vec![
            json!({"id": 1, "name": "tag1"}),
            json!({"id": 2, "name": "tag2"}),
            json!({"id": 3, "name": "tag3"}),
        ],
    );
    executor.seed(
        "articles_tags",
        vec![
            json!({"article_id": 1, "tag_id": 1}),
            json!({"article_id": 1, "tag_id": 2}),
            json!({"article_id": 2, "tag_id": 1}),
            json!({"article_id": 2, "tag_id": 3}),
        ],
    );
    executor.seed(
        "posts",
        vec![
            text_row(1, 1, "First Post"),
            text_row(2, 3, "Second Post"),
            text_row(3, 1, "Third Post"),
        ],
    );
    executor
}

pub fn engine_with(registry: Registry, executor: &MemoryExecutor, config: EngineConfig) -> QueryEngine {
    init_tracing();
    QueryEngine::new(registry, Arc::new(executor.clone()), config).unwrap()
}

pub fn engine(strategy: &str, executor: &MemoryExecutor) -> QueryEngine {
    engine_with(associated_registry(strategy), executor, EngineConfig::default())
}

pub fn tag(id: i64, name: &str, article_id: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "ArticlesTag": {"article_id": article_id, "tag_id": id}
    })
}
