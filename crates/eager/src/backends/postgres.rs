//! PostgreSQL statement executor over an sqlx pool

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Pool, Postgres};

use super::core::{SqlDialect, StatementExecutor};
use crate::query::plan::SelectPlan;
use crate::row::RawRow;

/// Runs plans against PostgreSQL
#[derive(Clone)]
pub struct PgExecutor {
    pool: Arc<Pool<Postgres>>,
}

impl PgExecutor {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn run(&self, plan: &SelectPlan) -> anyhow::Result<Vec<RawRow>> {
        let (sql, params) = plan.to_sql(SqlDialect::PostgreSQL);
        tracing::debug!(sql = %sql, params = params.len(), "Executing select on PostgreSQL");

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_json_value(query, param);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }
}

/// Bind a JSON scalar to a sqlx query
fn bind_json_value<'a>(
    query: sqlx::query::Query<'a, Postgres, PgArguments>,
    value: &JsonValue,
) -> sqlx::query::Query<'a, Postgres, PgArguments> {
    match value {
        JsonValue::Null => query.bind(Option::<String>::None),
        JsonValue::Bool(b) => query.bind(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        JsonValue::String(s) => query.bind(s.clone()),
        other => query.bind(other.clone()),
    }
}

/// Convert a PostgreSQL row to a raw row
fn row_to_json(row: &PgRow) -> RawRow {
    use sqlx::{Column, Row};
    let mut map = RawRow::new();

    for (i, column) in row.columns().iter().enumerate() {
        let json_value = if let Ok(value) = row.try_get::<Option<String>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::String)
        } else if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<i32>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
            value.map_or(JsonValue::Null, |v| {
                serde_json::Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number)
            })
        } else if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::Bool)
        } else if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_rfc3339()))
        } else if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<JsonValue>, _>(i) {
            value.unwrap_or(JsonValue::Null)
        } else {
            JsonValue::Null
        };

        map.insert(column.name().to_string(), json_value);
    }

    map
}
