//! Contain planning and eager loading benchmarks
//!
//! Measures how long it takes to turn a contain tree into statements and to
//! run a full query against the in-memory executor.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elif_eager::{
    AssociationOptions, Collection, EngineConfig, FieldType, MemoryExecutor, QueryEngine, Registry, SqlDialect,
};
use serde_json::{json, Value};

fn registry() -> Registry {
    let registry = Registry::new();
    let text = || {
        vec![
            ("id", FieldType::Integer),
            ("author_id", FieldType::Integer),
            ("title", FieldType::String),
        ]
    };
    let named = || vec![("id", FieldType::Integer), ("name", FieldType::String)];

    registry
        .register(Collection::new("author").table("authors").fields(named()))
        .unwrap();
    registry
        .register(Collection::new("article").table("articles").fields(text()))
        .unwrap();
    registry
        .register(Collection::new("post").table("posts").fields(text()))
        .unwrap();
    registry
        .register(Collection::new("Tag").table("tags").fields(named()))
        .unwrap();
    registry
        .register(Collection::new("ArticlesTag").table("articles_tags"))
        .unwrap();

    registry
        .has_many("author", "article", AssociationOptions::new().property("articles"))
        .unwrap();
    registry
        .has_many("author", "post", AssociationOptions::new().property("posts"))
        .unwrap();
    registry
        .belongs_to("article", "author", AssociationOptions::new())
        .unwrap();
    registry
        .belongs_to_many("article", "Tag", AssociationOptions::new().property("tags"))
        .unwrap();
    registry
}

fn executor(authors: i64) -> MemoryExecutor {
    let executor = MemoryExecutor::new();
    let rows = |count: i64, f: &dyn Fn(i64) -> Value| (1..=count).map(|id| f(id)).collect::<Vec<_>>();

    executor.seed("authors", rows(authors, &|id| json!({"id": id, "name": format!("author {}", id)})));
    executor.seed(
        "articles",
        rows(authors * 4, &|id| json!({"id": id, "author_id": (id % authors) + 1, "title": format!("article {}", id)})),
    );
    executor.seed(
        "posts",
        rows(authors * 2, &|id| json!({"id": id, "author_id": (id % authors) + 1, "title": format!("post {}", id)})),
    );
    executor.seed("tags", rows(10, &|id| json!({"id": id, "name": format!("tag{}", id)})));
    executor.seed(
        "articles_tags",
        rows(authors * 4, &|id| json!({"article_id": id, "tag_id": (id % 10) + 1})),
    );
    executor
}

fn engine(executor: &MemoryExecutor) -> QueryEngine {
    QueryEngine::new(registry(), Arc::new(executor.clone()), EngineConfig::default()).unwrap()
}

fn bench_contain_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("contain_planning");
    let executor = executor(10);
    let engine = engine(&executor);

    group.bench_function("belongs_to_join", |b| {
        let mut query = engine.query("article").unwrap();
        query.contain("author").unwrap();

        b.iter(|| black_box(query.plan().unwrap()))
    });

    group.bench_function("nested_mixed_strategies", |b| {
        let mut query = engine.query("article").unwrap();
        query
            .contain(json!({"author": ["post"], "Tag": {"conditions": {"name": "tag1"}}}))
            .unwrap();

        b.iter(|| black_box(query.plan().unwrap()))
    });

    group.bench_function("normalize_contain_tree", |b| {
        b.iter(|| {
            let mut query = engine.query("author").unwrap();
            query
                .contain(black_box(json!({"article": {"author": {}, "Tag": {"fields": ["id", "name"]}}, "post": {}})))
                .unwrap();
            black_box(query.contain_tree().nodes().len())
        })
    });

    group.bench_function("render_sql", |b| {
        let mut query = engine.query("article").unwrap();
        query
            .contain(json!({"author": {}, "Tag": {"matching": true}}))
            .unwrap();
        let plan = query.plan().unwrap();

        b.iter(|| black_box(plan.select.to_sql(SqlDialect::PostgreSQL)))
    });

    group.finish();
}

fn bench_eager_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_loading");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for authors in [10, 100, 500] {
        let executor = executor(authors);
        let engine = engine(&executor);

        group.bench_with_input(BenchmarkId::new("has_many_select", authors), &authors, |b, _| {
            b.to_async(&runtime).iter(|| {
                executor.reset_history();
                let engine = engine.clone();
                async move {
                    let mut query = engine.query("author").unwrap();
                    query.contain("article").unwrap().hydrate(false);
                    black_box(query.to_values().await.unwrap())
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("hydrated_nested", authors), &authors, |b, _| {
            b.to_async(&runtime).iter(|| {
                executor.reset_history();
                let engine = engine.clone();
                async move {
                    let mut query = engine.query("author").unwrap();
                    query.contain(json!({"article": ["Tag"], "post": {}})).unwrap();
                    black_box(query.to_vec().await.unwrap())
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_contain_planning, bench_eager_loading);
criterion_main!(benches);
