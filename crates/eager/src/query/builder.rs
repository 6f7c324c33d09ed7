//! Query Builder - fluent, association-aware SELECT queries
//!
//! A [`Query`] collects clauses and a containment tree, plans them into one
//! root statement plus deferred branches, and memoizes the assembled
//! [`ResultSet`]. Any configuration change drops the memo; toggling hydration
//! or buffering does not.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use super::conditions::{Condition, ConditionSet};
use super::options::QueryOptions;
use super::plan::{JoinClause, SelectPlan, TableRef};
use super::types::{JoinType, SortKey};
use crate::assembly::assemble;
use crate::backends::StatementExecutor;
use crate::config::EngineConfig;
use crate::contain::{normalize, ContainTree, IntoContain};
use crate::error::{OrmError, OrmResult};
use crate::hydration::Hydrator;
use crate::loading::{run_statement, EagerLoader};
use crate::pipeline::{Mapper, Reducer, Stage};
use crate::planner::{JoinPlanner, StatementBase, StatementPlan};
use crate::result::{ResultItem, ResultSet};
use crate::schema::Registry;

/// Anything `where_` or `having` accepts
pub trait IntoConditions {
    fn into_conditions(self) -> OrmResult<ConditionSet>;
}

impl IntoConditions for ConditionSet {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        Ok(self)
    }
}

impl IntoConditions for Condition {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        Ok(ConditionSet::new().and(self))
    }
}

impl IntoConditions for Vec<Condition> {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        Ok(ConditionSet::from(self))
    }
}

impl IntoConditions for &str {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        Ok(ConditionSet::new().and(Condition::from_raw(self)))
    }
}

impl IntoConditions for Value {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        ConditionSet::from_value(&self)
    }
}

impl IntoConditions for &Value {
    fn into_conditions(self) -> OrmResult<ConditionSet> {
        ConditionSet::from_value(self)
    }
}

/// Anything `order` accepts
pub trait IntoSortKeys {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>>;
}

impl IntoSortKeys for SortKey {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>> {
        Ok(vec![self])
    }
}

impl IntoSortKeys for Vec<SortKey> {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>> {
        Ok(self)
    }
}

impl IntoSortKeys for &str {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>> {
        SortKey::parse_list(&Value::String(self.to_string()))
    }
}

impl IntoSortKeys for Value {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>> {
        SortKey::parse_list(&self)
    }
}

impl IntoSortKeys for &Value {
    fn into_sort_keys(self) -> OrmResult<Vec<SortKey>> {
        SortKey::parse_list(self)
    }
}

/// Entry point: a registry, an executor and engine limits
#[derive(Clone)]
pub struct QueryEngine {
    registry: Registry,
    executor: Arc<dyn StatementExecutor>,
    config: EngineConfig,
    planner: JoinPlanner,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("registry", &self.registry)
            .field("dialect", &self.executor.dialect())
            .field("config", &self.config)
            .finish()
    }
}

impl QueryEngine {
    pub fn new(registry: Registry, executor: Arc<dyn StatementExecutor>, config: EngineConfig) -> OrmResult<Self> {
        config.validate()?;
        Ok(Self {
            planner: JoinPlanner::new(registry.clone()),
            registry,
            executor,
            config,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<dyn StatementExecutor> {
        &self.executor
    }

    /// Start a query rooted at `collection`
    pub fn query(&self, collection: &str) -> OrmResult<Query> {
        if !self.registry.has_collection(collection) {
            return Err(OrmError::UnknownCollection(collection.to_string()));
        }
        Ok(Query::new(self.clone(), collection))
    }
}

/// Association-aware SELECT query
#[derive(Debug, Clone)]
pub struct Query {
    engine: QueryEngine,
    collection: String,
    select: Vec<String>,
    conditions: ConditionSet,
    order: Vec<SortKey>,
    limit: Option<u64>,
    offset: Option<u64>,
    group: Vec<String>,
    having: ConditionSet,
    joins: Vec<JoinClause>,
    contain: ContainTree,
    stages: Vec<Stage>,
    hydrate: bool,
    buffered: bool,
    options: Map<String, Value>,
    result: Option<ResultSet>,
}

impl Query {
    fn new(engine: QueryEngine, collection: &str) -> Self {
        let hydrate = engine.config.hydrate_by_default;
        let buffered = engine.config.buffer_by_default;
        Self {
            engine,
            collection: collection.to_string(),
            select: Vec::new(),
            conditions: ConditionSet::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            group: Vec::new(),
            having: ConditionSet::new(),
            joins: Vec::new(),
            contain: ContainTree::new(),
            stages: Vec::new(),
            hydrate,
            buffered,
            options: Map::new(),
            result: None,
        }
    }

    fn dirty(&mut self) {
        if self.result.take().is_some() {
            tracing::trace!(collection = %self.collection, "Query changed, dropping memoized result");
        }
    }

    /// Root collection name, also the root alias
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Add entries to the select list (`field` or `alias.field`)
    pub fn select<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.select.contains(&field) {
                self.select.push(field);
            }
        }
        self.dirty();
        self
    }

    /// And-combine conditions into WHERE
    pub fn where_(&mut self, conditions: impl IntoConditions) -> OrmResult<&mut Self> {
        let conditions = conditions.into_conditions()?;
        self.conditions.merge(&conditions);
        self.dirty();
        Ok(self)
    }

    /// Alias of [`Query::where_`]
    pub fn conditions(&mut self, conditions: impl IntoConditions) -> OrmResult<&mut Self> {
        self.where_(conditions)
    }

    pub fn order(&mut self, order: impl IntoSortKeys) -> OrmResult<&mut Self> {
        self.order.extend(order.into_sort_keys()?);
        self.dirty();
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self.dirty();
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self.dirty();
        self
    }

    pub fn group<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group.extend(columns.into_iter().map(Into::into));
        self.dirty();
        self
    }

    pub fn having(&mut self, conditions: impl IntoConditions) -> OrmResult<&mut Self> {
        let conditions = conditions.into_conditions()?;
        self.having.merge(&conditions);
        self.dirty();
        Ok(self)
    }

    /// Add an explicit join
    pub fn join(&mut self, join: JoinClause) -> &mut Self {
        self.joins.push(join);
        self.dirty();
        self
    }

    /// Add joins from `{"alias": {"table": .., "type": .., "conditions": ..}}`
    ///
    /// `table` defaults to the alias and `type` to INNER. A list of maps
    /// carrying an `alias` key is accepted too.
    pub fn join_value(&mut self, value: &Value) -> OrmResult<&mut Self> {
        let joins = parse_joins(value)?;
        self.joins.extend(joins);
        self.dirty();
        Ok(self)
    }

    /// Accumulate into the containment tree
    pub fn contain(&mut self, contain: impl IntoContain) -> OrmResult<&mut Self> {
        let mut tree = self.contain.clone();
        tree.merge(contain.into_contain()?);
        normalize(&tree, &self.collection, &self.engine.registry, &self.engine.config)?;
        self.contain = tree;
        self.dirty();
        Ok(self)
    }

    /// Replace the containment tree
    pub fn contain_overwrite(&mut self, contain: impl IntoContain) -> OrmResult<&mut Self> {
        let tree = ContainTree::from_nodes(contain.into_contain()?);
        normalize(&tree, &self.collection, &self.engine.registry, &self.engine.config)?;
        self.contain = tree;
        self.dirty();
        Ok(self)
    }

    /// Yield entities (`true`) or plain records (`false`)
    pub fn hydrate(&mut self, hydrate: bool) -> &mut Self {
        self.hydrate = hydrate;
        self
    }

    /// Buffer the next result set so it can be iterated repeatedly
    pub fn buffer_results(&mut self, buffer: bool) -> &mut Self {
        self.buffered = buffer;
        self
    }

    /// Append a map/reduce stage, or replace all stages with `overwrite`
    pub fn map_reduce(
        &mut self,
        mapper: Arc<dyn Mapper>,
        reducer: Option<Arc<dyn Reducer>>,
        overwrite: bool,
    ) -> &mut Self {
        if overwrite {
            self.stages.clear();
        }
        self.stages.push(Stage::new(mapper, reducer));
        self.dirty();
        self
    }

    /// Drop every map/reduce stage
    pub fn clear_map_reduce(&mut self) -> &mut Self {
        self.stages.clear();
        self.dirty();
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Bulk configuration; unrecognized keys are stored verbatim
    pub fn apply_options(&mut self, options: QueryOptions) -> OrmResult<&mut Self> {
        let QueryOptions {
            fields,
            conditions,
            limit,
            order,
            offset,
            group,
            having,
            contain,
            join,
            extra,
        } = options;

        if let Some(fields) = fields {
            self.select(fields);
        }
        if let Some(conditions) = conditions {
            self.where_(conditions)?;
        }
        if let Some(limit) = limit {
            self.limit(limit);
        }
        if let Some(order) = order {
            self.order(order)?;
        }
        if let Some(offset) = offset {
            self.offset(offset);
        }
        if let Some(group) = group {
            self.group(group);
        }
        if let Some(having) = having {
            self.having(having)?;
        }
        if let Some(contain) = contain {
            self.contain(contain)?;
        }
        if let Some(join) = join {
            self.join_value(&join)?;
        }
        if !extra.is_empty() {
            tracing::debug!(
                collection = %self.collection,
                keys = ?extra.keys().collect::<Vec<_>>(),
                "Storing custom query options"
            );
            self.options.extend(extra);
        }
        self.dirty();
        Ok(self)
    }

    pub fn apply_options_value(&mut self, options: Value) -> OrmResult<&mut Self> {
        self.apply_options(QueryOptions::from_value(options)?)
    }

    /// Options given to `apply_options` that map to no clause
    pub fn get_options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn select_clause(&self) -> &[String] {
        &self.select
    }

    pub fn where_clause(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn order_clause(&self) -> &[SortKey] {
        &self.order
    }

    pub fn limit_clause(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_clause(&self) -> Option<u64> {
        self.offset
    }

    pub fn group_clause(&self) -> &[String] {
        &self.group
    }

    pub fn having_clause(&self) -> &ConditionSet {
        &self.having
    }

    pub fn join_clause(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn contain_tree(&self) -> &ContainTree {
        &self.contain
    }

    pub fn is_hydrating(&self) -> bool {
        self.hydrate
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Plan the root statement and its deferred branches
    pub fn plan(&self) -> OrmResult<StatementPlan> {
        let root = self.engine.registry.collection(&self.collection)?;
        let mut select = SelectPlan::new(TableRef::new(root.table.clone(), self.collection.clone()));
        select.conditions = self.conditions.clone();
        select.having = self.having.clone();
        select.order_by = self.order.clone();
        select.group_by = self.group.clone();
        select.joins = self.joins.clone();
        select.limit = self.limit;
        select.offset = self.offset;

        let base = StatementBase {
            collection: self.collection.clone(),
            select: self.select.clone(),
            plan: select,
        };
        self.engine.planner.plan(base, &self.contain)
    }

    /// Root statement rendered for the executor's dialect
    pub fn sql(&self) -> OrmResult<(String, Vec<Value>)> {
        let plan = self.plan()?;
        Ok(plan.select.to_sql(self.engine.executor.dialect()))
    }

    /// Run the query, or return the memoized result
    pub async fn execute(&mut self) -> OrmResult<ResultSet> {
        if let Some(result) = &self.result {
            tracing::debug!(collection = %self.collection, "Reusing memoized result set");
            return Ok(result.clone().with_hydration(self.hydrate));
        }

        let started = Instant::now();
        let plan = self.plan()?;
        let executor = self.engine.executor.as_ref();
        let rows = run_statement(executor, &plan.select).await?;

        let loader = EagerLoader::new(&self.engine.planner, executor, &self.engine.config);
        let loaded = loader.load(&plan, &plan.select, &rows).await?;
        let records: Vec<Value> = assemble(&plan.assembly, &plan.deferred, &loaded, &rows)
            .into_iter()
            .map(|(_, record)| Value::Object(record))
            .collect();

        tracing::debug!(
            collection = %self.collection,
            rows = rows.len(),
            records = records.len(),
            queries = 1 + loaded.iter().map(|branch| branch.query_count).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Executed query"
        );

        let hydrator = Hydrator::new(self.engine.registry.clone(), plan.shape);
        let result = ResultSet::new(records, self.stages.clone(), Some(hydrator), self.buffered)
            .with_hydration(self.hydrate);
        self.result = Some(result.clone());
        Ok(result)
    }

    /// First element; limits the statement to one row unless a result exists
    pub async fn first(&mut self) -> OrmResult<Option<ResultItem>> {
        if self.result.is_none() {
            self.limit(1);
        }
        self.execute().await?.first()
    }

    /// Every element of the result
    pub async fn to_vec(&mut self) -> OrmResult<Vec<ResultItem>> {
        self.execute().await?.to_vec()
    }

    /// Every element in plain JSON form
    pub async fn to_values(&mut self) -> OrmResult<Vec<Value>> {
        self.execute().await?.to_values()
    }

    /// Use `result` instead of executing
    pub fn set_result(&mut self, result: ResultSet) -> &mut Self {
        self.result = Some(result);
        self
    }

    pub fn result(&self) -> Option<&ResultSet> {
        self.result.as_ref()
    }
}

fn parse_joins(value: &Value) -> OrmResult<Vec<JoinClause>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => map
            .iter()
            .map(|(alias, spec)| parse_join(alias, spec))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let alias = item
                    .get("alias")
                    .and_then(Value::as_str)
                    .ok_or_else(|| OrmError::Configuration(format!("Join entry without alias: {}", item)))?;
                parse_join(alias, item)
            })
            .collect(),
        other => Err(OrmError::Configuration(format!(
            "Invalid join specification: {}",
            other
        ))),
    }
}

fn parse_join(alias: &str, spec: &Value) -> OrmResult<JoinClause> {
    let table = match spec.get("table") {
        Some(Value::String(table)) => table.clone(),
        _ => alias.to_string(),
    };
    let join_type = match spec.get("type") {
        Some(Value::String(kind)) => kind.parse()?,
        _ => JoinType::Inner,
    };
    let conditions = match spec.get("conditions") {
        Some(conditions) => ConditionSet::from_value(conditions)?,
        None => ConditionSet::new(),
    };
    Ok(JoinClause::new(join_type, TableRef::new(table, alias), conditions))
}
