//! In-memory statement executor
//!
//! Evaluates [`SelectPlan`]s against tables held in memory: joins, comparisons,
//! `IN` lists and sub-selects, grouping, ordering, limits and projection. Every
//! executed plan is recorded so callers can inspect what the engine issued.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::core::{SqlDialect, StatementExecutor};
use crate::query::conditions::{Condition, ConditionSet};
use crate::query::plan::{SelectField, SelectPlan};
use crate::query::types::{split_qualified, JoinType, OrderDirection, QueryOperator};
use crate::row::{canonical_key, compare_values, values_equal, RawRow};

/// One candidate row under construction: `(alias, row)` pairs, `None` for a missed LEFT join
type Tuple = Vec<(String, Option<RawRow>)>;

/// Statement executor backed by in-memory tables
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    tables: Arc<DashMap<String, Vec<RawRow>>>,
    executions: Arc<AtomicUsize>,
    history: Arc<Mutex<Vec<SelectPlan>>>,
    dialect: Option<SqlDialect>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render plans with `dialect` instead of PostgreSQL
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Replace the contents of `table`
    pub fn insert_table(&self, table: &str, rows: Vec<RawRow>) {
        self.tables.insert(table.to_string(), rows);
    }

    /// Insert rows given as JSON objects; non-object values are skipped
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.insert_table(table, rows);
    }

    /// Number of statements executed so far
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Plans executed so far, in order
    pub fn executed_plans(&self) -> Vec<SelectPlan> {
        self.history.lock().clone()
    }

    pub fn reset_history(&self) {
        self.executions.store(0, Ordering::SeqCst);
        self.history.lock().clear();
    }

    fn table_rows(&self, table: &str) -> anyhow::Result<Vec<RawRow>> {
        self.tables
            .get(table)
            .map(|rows| rows.clone())
            .ok_or_else(|| anyhow::anyhow!("relation \"{}\" does not exist", table))
    }

    /// Evaluate a plan without recording it
    pub fn evaluate(&self, plan: &SelectPlan) -> anyhow::Result<Vec<RawRow>> {
        let root_alias = plan.from.alias.as_str();
        let mut tuples: Vec<Tuple> = self
            .table_rows(&plan.from.table)?
            .into_iter()
            .map(|row| vec![(plan.from.alias.clone(), Some(row))])
            .collect();

        for join in &plan.joins {
            let candidates = self.table_rows(&join.table.table)?;
            let mut joined = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let mut matched = false;
                for candidate in &candidates {
                    let mut extended = tuple.clone();
                    extended.push((join.table.alias.clone(), Some(candidate.clone())));
                    if self.matches(&join.conditions, &extended, root_alias)? {
                        matched = true;
                        joined.push(extended);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut extended = tuple;
                    extended.push((join.table.alias.clone(), None));
                    joined.push(extended);
                }
            }
            tuples = joined;
        }

        let mut filtered = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if self.matches(&plan.conditions, &tuple, root_alias)? {
                filtered.push(tuple);
            }
        }

        if !plan.group_by.is_empty() {
            let mut seen = HashSet::new();
            filtered.retain(|tuple| {
                let key: Vec<Value> = plan
                    .group_by
                    .iter()
                    .map(|column| lookup(tuple, column, root_alias))
                    .collect();
                seen.insert(signature(key.iter()))
            });
        }

        if !plan.having.is_empty() {
            let mut kept = Vec::with_capacity(filtered.len());
            for tuple in filtered {
                if self.matches(&plan.having, &tuple, root_alias)? {
                    kept.push(tuple);
                }
            }
            filtered = kept;
        }

        if !plan.order_by.is_empty() {
            filtered.sort_by(|a, b| {
                for key in &plan.order_by {
                    let ordering = compare_values(
                        &lookup(a, &key.column, root_alias),
                        &lookup(b, &key.column, root_alias),
                    );
                    let ordering = match key.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = plan.offset.unwrap_or(0) as usize;
        let limit = plan.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let window = filtered.into_iter().skip(offset).take(limit);

        let mut rows: Vec<RawRow> = Vec::new();
        for tuple in window {
            rows.push(project(&plan.fields, &tuple, root_alias)?);
        }

        if plan.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| seen.insert(signature(row.values())));
        }

        Ok(rows)
    }

    fn matches(&self, conditions: &ConditionSet, tuple: &Tuple, root_alias: &str) -> anyhow::Result<bool> {
        for condition in conditions {
            if !self.condition_holds(condition, tuple, root_alias)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn condition_holds(&self, condition: &Condition, tuple: &Tuple, root_alias: &str) -> anyhow::Result<bool> {
        Ok(match condition {
            Condition::Compare {
                column,
                operator,
                value,
            } => compare(&lookup(tuple, column, root_alias), *operator, value),
            Condition::Columns {
                left,
                operator,
                right,
            } => compare(
                &lookup(tuple, left, root_alias),
                *operator,
                &lookup(tuple, right, root_alias),
            ),
            Condition::In {
                column,
                values,
                negated,
            } => {
                let current = lookup(tuple, column, root_alias);
                let found = values.iter().any(|v| values_equal(&current, v));
                found != *negated
            }
            Condition::InSubquery { column, subquery } => {
                let current = lookup(tuple, column, root_alias);
                let keys = self.evaluate(subquery)?;
                keys.iter()
                    .filter_map(|row| row.values().next())
                    .any(|v| values_equal(&current, v))
            }
            Condition::IsNull { column, negated } => {
                lookup(tuple, column, root_alias).is_null() != *negated
            }
            Condition::Raw(sql) => {
                anyhow::bail!("in-memory backend cannot evaluate raw SQL: {}", sql)
            }
        })
    }
}

#[async_trait]
impl StatementExecutor for MemoryExecutor {
    async fn run(&self, plan: &SelectPlan) -> anyhow::Result<Vec<RawRow>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.history.lock().push(plan.clone());
        self.evaluate(plan)
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect.unwrap_or(SqlDialect::PostgreSQL)
    }
}

/// Comparable signature of a value list where nulls compare equal to each other
fn signature<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .map(|value| canonical_key(value).unwrap_or_else(|| "\u{0}".to_string()))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn lookup(tuple: &Tuple, column: &str, root_alias: &str) -> Value {
    let (alias, name) = split_qualified(column);
    let alias = alias.unwrap_or(root_alias);
    tuple
        .iter()
        .find(|(candidate, _)| candidate == alias)
        .and_then(|(_, row)| row.as_ref())
        .and_then(|row| row.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

fn project(fields: &[SelectField], tuple: &Tuple, root_alias: &str) -> anyhow::Result<RawRow> {
    let mut row = RawRow::new();

    if fields.is_empty() {
        if let Some((_, Some(root))) = tuple.first() {
            row.extend(root.clone());
        }
        return Ok(row);
    }

    for field in fields {
        match &field.table {
            Some(table) if field.is_wildcard() => {
                if let Some((_, Some(source))) = tuple.iter().find(|(alias, _)| alias == table) {
                    row.extend(source.clone());
                }
            }
            Some(table) => {
                let value = lookup(tuple, &format!("{}.{}", table, field.column), root_alias);
                row.insert(field.output_name(), value);
            }
            None => {
                if field.column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                    let value = lookup(tuple, &field.column, root_alias);
                    row.insert(field.output_name(), value);
                } else {
                    anyhow::bail!(
                        "in-memory backend cannot evaluate expression: {}",
                        field.column
                    );
                }
            }
        }
    }

    Ok(row)
}

fn compare(left: &Value, operator: QueryOperator, right: &Value) -> bool {
    use std::cmp::Ordering as Cmp;

    if left.is_null() || right.is_null() {
        return false;
    }

    match operator {
        QueryOperator::Equal => values_equal(left, right),
        QueryOperator::NotEqual => !values_equal(left, right),
        QueryOperator::GreaterThan => compare_values(left, right) == Cmp::Greater,
        QueryOperator::GreaterThanOrEqual => compare_values(left, right) != Cmp::Less,
        QueryOperator::LessThan => compare_values(left, right) == Cmp::Less,
        QueryOperator::LessThanOrEqual => compare_values(left, right) != Cmp::Greater,
        QueryOperator::Like => like(left, right),
        QueryOperator::NotLike => !like(left, right),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    let (Some(value), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
        return false;
    };
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return value == pattern;
    }

    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}
