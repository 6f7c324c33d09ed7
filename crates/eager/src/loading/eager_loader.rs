use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use serde_json::Value;

use super::run_statement;
use crate::assembly::assemble;
use crate::backends::StatementExecutor;
use crate::config::EngineConfig;
use crate::error::{OrmError, OrmResult};
use crate::planner::{DeferredBranch, JoinPlanner, StatementPlan};
use crate::query::conditions::Condition;
use crate::query::plan::SelectPlan;
use crate::relationships::association::Strategy;
use crate::row::{canonical_key, RawRow};

type LoadFuture<'a, T> = Pin<Box<dyn Future<Output = OrmResult<T>> + Send + 'a>>;

/// Assembled target records of one deferred branch, grouped by match key
#[derive(Debug, Clone, Default)]
pub struct EagerLoadResult {
    index: HashMap<String, Vec<Value>>,
    /// Statements issued for this branch, nested branches included
    pub query_count: usize,
    /// Target records loaded by this branch
    pub records_loaded: usize,
}

impl EagerLoadResult {
    /// Records matched to `key`, in fetch order
    pub fn get(&self, key: &str) -> Option<&[Value]> {
        self.index.get(key).map(Vec::as_slice)
    }

    pub fn push(&mut self, key: String, record: Value) {
        self.index.entry(key).or_default().push(record);
    }

    /// Number of distinct match keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Loads deferred branches after their owner statement ran
///
/// Branches are loaded one after another in containment order; a branch's own
/// deferred children are loaded before the next sibling starts.
pub struct EagerLoader<'a> {
    planner: &'a JoinPlanner,
    executor: &'a dyn StatementExecutor,
    config: &'a EngineConfig,
}

impl<'a> EagerLoader<'a> {
    pub fn new(planner: &'a JoinPlanner, executor: &'a dyn StatementExecutor, config: &'a EngineConfig) -> Self {
        Self {
            planner,
            executor,
            config,
        }
    }

    /// Load every deferred branch of `plan`; `parent` is the statement that produced `rows`
    pub fn load<'b>(
        &'b self,
        plan: &'b StatementPlan,
        parent: &'b SelectPlan,
        rows: &'b [RawRow],
    ) -> LoadFuture<'b, Vec<EagerLoadResult>> {
        Box::pin(async move {
            let mut results = Vec::with_capacity(plan.deferred.len());
            for branch in &plan.deferred {
                results.push(self.load_branch(branch, parent, rows).await?);
            }
            Ok(results)
        })
    }

    fn load_branch<'b>(
        &'b self,
        branch: &'b DeferredBranch,
        parent: &'b SelectPlan,
        rows: &'b [RawRow],
    ) -> LoadFuture<'b, EagerLoadResult> {
        Box::pin(async move {
            let started = Instant::now();
            let keys = owner_keys(rows, &branch.owner_key_column);
            if keys.is_empty() {
                tracing::debug!(
                    association = %branch.descriptor.name,
                    "No owner keys, skipping eager load"
                );
                return Ok(EagerLoadResult::default());
            }

            let sub = self.planner.plan_deferred(branch)?;
            let (match_column, match_source) = match (&sub.match_column, &sub.match_source) {
                (Some(column), Some(source)) => (column.clone(), source.clone()),
                _ => {
                    return Err(OrmError::Configuration(format!(
                        "Deferred statement for '{}' has no match column",
                        branch.descriptor.name
                    )))
                }
            };

            let (executed, sub_rows, query_count) = match branch.strategy {
                Strategy::Subquery => {
                    let keys_plan = self.executor.build_subquery(parent, &branch.owner_key_source);
                    let mut executed = sub.select.clone();
                    executed
                        .conditions
                        .push(Condition::in_subquery(match_source, keys_plan));
                    let sub_rows = run_statement(self.executor, &executed).await?;
                    (executed, sub_rows, 1)
                }
                Strategy::Select | Strategy::Join => {
                    let mut sub_rows = Vec::new();
                    let mut query_count = 0;
                    for chunk in keys.chunks(self.config.max_keys_per_query) {
                        let mut statement = sub.select.clone();
                        statement
                            .conditions
                            .push(Condition::is_in(match_source.clone(), chunk.to_vec()));
                        sub_rows.extend(run_statement(self.executor, &statement).await?);
                        query_count += 1;
                    }
                    let mut executed = sub.select.clone();
                    executed
                        .conditions
                        .push(Condition::is_in(match_source, keys.clone()));
                    (executed, sub_rows, query_count)
                }
            };

            let nested = self.load(&sub, &executed, &sub_rows).await?;
            let records = assemble(&sub.assembly, &sub.deferred, &nested, &sub_rows);

            let mut result = EagerLoadResult {
                query_count: query_count + nested.iter().map(|n| n.query_count).sum::<usize>(),
                records_loaded: records.len(),
                ..EagerLoadResult::default()
            };
            for (index, record) in records {
                let key = sub_rows
                    .get(index)
                    .and_then(|row| row.get(&match_column))
                    .and_then(canonical_key);
                if let Some(key) = key {
                    result.push(key, Value::Object(record));
                }
            }

            tracing::debug!(
                association = %branch.descriptor.name,
                strategy = %branch.strategy,
                owner_keys = keys.len(),
                queries = result.query_count,
                records = result.records_loaded,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Eager loaded association"
            );

            Ok(result)
        })
    }
}

/// Distinct non-null values of `column`, in first-seen order
fn owner_keys(rows: &[RawRow], column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| canonical_key(value).map_or(false, |key| seen.insert(key)))
        .cloned()
        .collect()
}
