mod common;

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use common::article;
use elif_eager::{
    Collection, Emitter, EngineConfig, Entity, FieldType, GenericEntity, MapKey, Mapper, OrmError, OrmResult,
    Property, PropertyMap, Reducer, ResultSet,
};
use serde_json::{json, Value};

#[derive(Debug)]
struct AuthorEntity {
    properties: PropertyMap,
}

impl AuthorEntity {
    fn name(&self) -> Option<&str> {
        self.properties
            .get("name")
            .and_then(Property::as_value)
            .and_then(Value::as_str)
    }
}

impl Entity for AuthorEntity {
    fn source(&self) -> &str {
        "author"
    }

    fn get(&self, property: &str) -> Option<&Property> {
        self.properties.get(property)
    }

    fn properties(&self) -> Vec<&str> {
        self.properties.names()
    }

    fn to_value(&self) -> Value {
        self.properties.to_value()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn test_execute_is_memoized() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("author").unwrap();
    query.contain("article").unwrap();
    let first = query.execute().await.unwrap();
    let second = query.execute().await.unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(executor.execution_count(), 2);

    query.hydrate(false).buffer_results(true);
    let plain = query.execute().await.unwrap();
    assert!(plain.ptr_eq(&first));
    assert!(!plain.is_hydrated());
    assert_eq!(executor.execution_count(), 2);

    query.where_(json!({"id": 1})).unwrap();
    let filtered = query.execute().await.unwrap();
    assert!(!filtered.ptr_eq(&first));
    assert_eq!(filtered.len(), 1);
    assert_eq!(executor.execution_count(), 4);
}

#[tokio::test]
async fn test_first_on_dirty_query_limits_statement() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    let first = query.select(["id"]).hydrate(false).first().await.unwrap();
    assert_eq!(first.map(|item| item.to_value()), Some(json!({"id": 1})));
    assert_eq!(query.limit_clause(), Some(1));

    let again = query.select(["id"]).first().await.unwrap();
    assert_eq!(again.map(|item| item.to_value()), Some(json!({"id": 1})));
    assert_eq!(executor.execution_count(), 2);
}

#[tokio::test]
async fn test_first_on_clean_query_reuses_result() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    query.select(["id"]);
    assert_eq!(query.to_vec().await.unwrap().len(), 3);

    let first = query.hydrate(false).first().await.unwrap();
    assert_eq!(first.map(|item| item.to_value()), Some(json!({"id": 1})));
    assert_eq!(query.limit_clause(), None);

    let memo = query.result().cloned().unwrap();
    assert!(query.execute().await.unwrap().ptr_eq(&memo));
    assert_eq!(executor.execution_count(), 1);
}

#[tokio::test]
async fn test_set_result_replaces_execution() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let injected = ResultSet::from_records(vec![json!({"id": 42})]);
    let mut query = engine.query("article").unwrap();
    query.set_result(injected.clone());

    let result = query.execute().await.unwrap();
    assert!(result.ptr_eq(&injected));
    assert_eq!(result.to_values().unwrap(), vec![json!({"id": 42})]);
    assert_eq!(executor.execution_count(), 0);
}

#[tokio::test]
async fn test_buffered_results_can_be_iterated_twice() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("author").unwrap();
    let unbuffered = query.execute().await.unwrap();
    assert!(!unbuffered.is_buffered());
    assert_eq!(unbuffered.iter().unwrap().count(), 4);
    assert_eq!(unbuffered.iter().unwrap().count(), 0);

    let mut query = engine.query("author").unwrap();
    query.buffer_results(true);
    let buffered = query.execute().await.unwrap();
    assert!(buffered.is_buffered());
    assert_eq!(buffered.iter().unwrap().count(), 4);
    assert_eq!(buffered.iter().unwrap().count(), 4);
}

#[tokio::test]
async fn test_results_are_wrapped_in_map_reduce() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let ids: Arc<dyn Mapper> = Arc::new(|_: &MapKey, value: &Value, emitter: &mut Emitter| {
        emitter.emit(value["id"].clone());
    });
    let regroup: Arc<dyn Mapper> = Arc::new(|key: &MapKey, value: &Value, emitter: &mut Emitter| {
        emitter.emit_intermediate(key.clone(), value.clone());
    });
    let increment: Arc<dyn Reducer> = Arc::new(|_: &MapKey, values: &[Value], emitter: &mut Emitter| {
        let first = values.first().and_then(Value::as_i64).unwrap_or_default();
        emitter.emit(json!(first + 1));
    });

    let mut query = engine.query("author").unwrap();
    query
        .select(["id"])
        .where_(json!({"id IN": [1, 2]}))
        .unwrap()
        .map_reduce(ids, None, false)
        .map_reduce(regroup, Some(increment), false);

    assert_eq!(query.to_values().await.unwrap(), vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn test_map_reduce_change_clears_memo() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("author").unwrap();
    query.execute().await.unwrap();
    assert!(query.result().is_some());

    let names: Arc<dyn Mapper> = Arc::new(|_: &MapKey, value: &Value, emitter: &mut Emitter| {
        emitter.emit(value["name"].clone());
    });
    query.map_reduce(names, None, true);
    assert!(query.result().is_none());
    assert_eq!(
        query.to_values().await.unwrap(),
        vec![json!("mariano"), json!("nate"), json!("larry"), json!("garrett")]
    );
}

#[tokio::test]
async fn test_hydrate_has_many_with_custom_entity() {
    let executor = common::executor();
    let registry = common::associated_registry("select");
    registry
        .register(
            Collection::new("author")
                .table("authors")
                .fields([("id", FieldType::Integer), ("name", FieldType::String)])
                .entity_factory(Arc::new(|_: &str, properties: PropertyMap| -> OrmResult<Arc<dyn Entity>> {
                    Ok(Arc::new(AuthorEntity { properties }))
                })),
        )
        .unwrap();
    let engine = common::engine_with(registry, &executor, EngineConfig::default());

    let mut query = engine.query("author").unwrap();
    query.contain("article").unwrap();
    let results = query.to_vec().await.unwrap();

    let first = results[0].downcast_ref::<AuthorEntity>().unwrap();
    assert_eq!(first.name(), Some("mariano"));

    let articles = first.get("articles").and_then(Property::as_entities).unwrap();
    assert_eq!(articles.len(), 2);
    assert!(articles[0].downcast_ref::<GenericEntity>().is_some());
    assert_eq!(articles[0].source(), "article");
    assert_eq!(articles[0].to_value(), article(1, 1, "First Article"));

    let nate = results[1].downcast_ref::<AuthorEntity>().unwrap();
    assert!(nate.get("articles").is_none());
}

#[tokio::test]
async fn test_hydrate_belongs_to_many_pivot() {
    let executor = common::executor();
    let registry = common::associated_registry("select");
    registry
        .register(
            Collection::new("ArticlesTag")
                .table("articles_tags")
                .entity_factory(Arc::new(|_: &str, properties: PropertyMap| -> OrmResult<Arc<dyn Entity>> {
                    Ok(Arc::new(GenericEntity::new("pivot", properties)))
                })),
        )
        .unwrap();
    let engine = common::engine_with(registry, &executor, EngineConfig::default());

    let mut query = engine.query("article").unwrap();
    query.contain("Tag").unwrap();
    let results = query.to_vec().await.unwrap();

    let first = results[0].as_entity().unwrap();
    let tags = first.get("tags").and_then(Property::as_entities).unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].source(), "Tag");
    assert_eq!(tags[0].value("name"), Some(&json!("tag1")));

    let pivot = tags[1].get("ArticlesTag").and_then(Property::as_entity).unwrap();
    assert_eq!(pivot.source(), "pivot");
    assert_eq!(pivot.to_value(), json!({"article_id": 1, "tag_id": 2}));
}

#[tokio::test]
async fn test_hydrate_belongs_to_missing_is_null() {
    let executor = common::executor();
    executor.seed("articles", vec![article(4, 99, "Fourth Article")]);
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    query.contain("author").unwrap();
    let results = query.to_vec().await.unwrap();
    let entity = results[0].as_entity().unwrap();
    assert!(entity.get("author").map_or(false, Property::is_null));
    assert_eq!(entity.value("title"), Some(&json!("Fourth Article")));
}

#[test]
fn test_contain_is_idempotent_and_merges_options() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("author").unwrap();
    query.contain("article").unwrap();
    query.contain("article").unwrap();
    assert_eq!(query.contain_tree().nodes().len(), 1);

    query
        .contain(json!({"article": {"fields": ["title", "author_id"]}}))
        .unwrap()
        .contain(json!({"article": {"sort": {"id": "DESC"}}}))
        .unwrap();
    let node = query.contain_tree().get("article").unwrap();
    assert!(node.options.fields.is_some());
    assert!(node.options.sort.is_some());

    query.contain_overwrite("post").unwrap();
    let names: Vec<&str> = query.contain_tree().nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["post"]);
}

#[test]
fn test_planned_aliases_are_unique() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    query
        .contain(json!({"author": ["post"], "Tag": {"matching": true}}))
        .unwrap();
    let plan = query.plan().unwrap();

    let aliases: Vec<&str> = plan.select.aliases().collect();
    let distinct: HashSet<&str> = aliases.iter().copied().collect();
    assert_eq!(aliases.len(), distinct.len());
    assert_eq!(aliases, vec!["article", "author", "ArticlesTag", "Tag"]);
    assert_eq!(plan.deferred.len(), 1);
    assert_eq!(plan.deferred[0].owner_alias, "author");
}

#[test]
fn test_sql_renders_joins_and_parameters() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    query
        .select(["id", "author.name"])
        .where_(json!({"published": "Y"}))
        .unwrap()
        .contain(json!({"author": {"fields": false}}))
        .unwrap();
    let (sql, params) = query.sql().unwrap();

    assert!(sql.starts_with("SELECT \"article\".\"id\" AS \"article__id\""));
    assert!(sql.contains("FROM \"articles\" \"article\""));
    assert!(sql.contains("LEFT JOIN \"authors\" \"author\" ON \"author\".\"id\" = \"article\".\"author_id\""));
    assert!(sql.contains("WHERE \"article\".\"published\" = $1"));
    assert_eq!(params, vec![json!("Y")]);
}

#[test]
fn test_configuration_errors() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("author").unwrap();
    let err = query.contain("comments").unwrap_err();
    assert!(matches!(
        err,
        OrmError::UnknownAssociation { ref collection, ref association }
            if collection == "author" && association == "comments"
    ));

    let err = query
        .contain(json!({"article": {"strategy": "eager"}}))
        .unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));

    let mut query = engine.query("article").unwrap();
    let err = query
        .contain(json!({"author": {"article": {"strategy": "join"}}}))
        .unwrap_err();
    assert!(matches!(err, OrmError::CyclicContainment { ref path } if path == "article.author.article"));

    let shallow = common::engine_with(
        common::associated_registry("select"),
        &executor,
        EngineConfig::default().with_max_depth(1),
    );
    let mut query = shallow.query("author").unwrap();
    assert!(matches!(
        query.contain(json!({"article": ["author"]})),
        Err(OrmError::Configuration(_))
    ));
    assert!(query.contain_tree().is_empty());
}

#[test]
fn test_explicit_join_alias_conflicts_with_contain() {
    let executor = common::executor();
    let engine = common::engine("select", &executor);

    let mut query = engine.query("article").unwrap();
    query
        .join_value(&json!({"author": {"table": "authors", "type": "LEFT", "conditions": ["author.id = article.author_id"]}}))
        .unwrap()
        .contain("author")
        .unwrap();
    assert!(matches!(query.plan(), Err(OrmError::AmbiguousAlias { alias }) if alias == "author"));
}
