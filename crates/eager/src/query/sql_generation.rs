//! SQL rendering for select plans

use serde_json::Value;

use super::conditions::{Condition, ConditionSet};
use super::plan::{SelectField, SelectPlan};
use crate::backends::SqlDialect;

impl SelectPlan {
    /// Generate SQL with parameter placeholders and return the bound parameters
    pub fn to_sql(&self, dialect: SqlDialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.render(dialect, &mut params);
        (sql, params)
    }

    fn render(&self, dialect: SqlDialect, params: &mut Vec<Value>) -> String {
        let mut sql = String::new();

        if self.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if self.fields.is_empty() {
            sql.push('*');
        } else {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|field| render_field(field, dialect))
                .collect();
            sql.push_str(&fields.join(", "));
        }

        sql.push_str(&format!(
            " FROM {} {}",
            dialect.quote_identifier(&self.from.table),
            dialect.quote_identifier(&self.from.alias)
        ));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&format!(
                "{} {}",
                dialect.quote_identifier(&join.table.table),
                dialect.quote_identifier(&join.table.alias)
            ));
            if !join.conditions.is_empty() {
                sql.push_str(" ON ");
                sql.push_str(&render_conditions(&join.conditions, dialect, params));
            }
        }

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.conditions, dialect, params));
        }

        if !self.group_by.is_empty() {
            let columns: Vec<String> = self
                .group_by
                .iter()
                .map(|c| dialect.quote_identifier(c))
                .collect();
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }

        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&render_conditions(&self.having, dialect, params));
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|key| format!("{} {}", dialect.quote_identifier(&key.column), key.direction))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

fn render_field(field: &SelectField, dialect: SqlDialect) -> String {
    let expression = match &field.table {
        Some(_) => dialect.quote_identifier(&field.qualified_name()),
        None => field.column.clone(),
    };
    match &field.alias {
        Some(alias) => format!("{} AS {}", expression, dialect.quote_identifier(alias)),
        None => expression,
    }
}

fn render_conditions(set: &ConditionSet, dialect: SqlDialect, params: &mut Vec<Value>) -> String {
    let parts: Vec<String> = set
        .iter()
        .map(|condition| render_condition(condition, dialect, params))
        .collect();
    parts.join(" AND ")
}

fn render_condition(condition: &Condition, dialect: SqlDialect, params: &mut Vec<Value>) -> String {
    match condition {
        Condition::Compare {
            column,
            operator,
            value,
        } => {
            let placeholder = bind(value.clone(), dialect, params);
            format!("{} {} {}", dialect.quote_identifier(column), operator, placeholder)
        }
        Condition::Columns {
            left,
            operator,
            right,
        } => format!(
            "{} {} {}",
            dialect.quote_identifier(left),
            operator,
            dialect.quote_identifier(right)
        ),
        Condition::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                // empty IN list matches nothing, empty NOT IN matches everything
                return if *negated { "1 = 1".to_string() } else { "1 = 0".to_string() };
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|value| bind(value.clone(), dialect, params))
                .collect();
            format!(
                "{} {}IN ({})",
                dialect.quote_identifier(column),
                if *negated { "NOT " } else { "" },
                placeholders.join(", ")
            )
        }
        Condition::InSubquery { column, subquery } => {
            let inner = subquery.render(dialect, params);
            format!("{} IN ({})", dialect.quote_identifier(column), inner)
        }
        Condition::IsNull { column, negated } => format!(
            "{} IS {}NULL",
            dialect.quote_identifier(column),
            if *negated { "NOT " } else { "" }
        ),
        Condition::Raw(sql) => sql.clone(),
    }
}

fn bind(value: Value, dialect: SqlDialect, params: &mut Vec<Value>) -> String {
    let placeholder = dialect.parameter_placeholder(params.len());
    params.push(value);
    placeholder
}
