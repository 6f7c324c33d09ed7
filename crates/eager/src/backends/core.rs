//! Core Statement Backend Traits
//!
//! The engine never talks to a connection directly. Built plans are handed to a
//! [`StatementExecutor`], which renders them for its dialect and yields raw rows.

use async_trait::async_trait;

use crate::query::plan::SelectPlan;
use crate::row::RawRow;

/// Statement execution primitive consumed by the query engine
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute a select statement and return its rows keyed by output column name
    async fn run(&self, plan: &SelectPlan) -> anyhow::Result<Vec<RawRow>>;

    /// SQL dialect used to render plans
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    /// Quote an identifier (`alias.column` parts are quoted separately)
    fn quote_identifier(&self, identifier: &str) -> String {
        self.dialect().quote_identifier(identifier)
    }

    /// Build a sub-select yielding `key_column` for every row `parent` would return
    fn build_subquery(&self, parent: &SelectPlan, key_column: &str) -> SelectPlan {
        parent.key_subquery(key_column)
    }
}

/// SQL dialect enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }

    /// Quote a possibly dotted identifier, leaving `*` untouched
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = self.identifier_quote();
        identifier
            .split('.')
            .map(|part| {
                if part == "*" {
                    part.to_string()
                } else {
                    let escaped = part.replace(quote, &format!("{}{}", quote, quote));
                    format!("{}{}{}", quote, escaped, quote)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}
