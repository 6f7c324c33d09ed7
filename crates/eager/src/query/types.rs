//! Query Types - Core types and enums for statement building

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{OrmError, OrmResult};

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

impl FromStr for QueryOperator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "=" | "==" => Ok(QueryOperator::Equal),
            "!=" | "<>" => Ok(QueryOperator::NotEqual),
            ">" => Ok(QueryOperator::GreaterThan),
            ">=" => Ok(QueryOperator::GreaterThanOrEqual),
            "<" => Ok(QueryOperator::LessThan),
            "<=" => Ok(QueryOperator::LessThanOrEqual),
            "LIKE" => Ok(QueryOperator::Like),
            "NOT LIKE" => Ok(QueryOperator::NotLike),
            other => Err(OrmError::Configuration(format!(
                "Unsupported comparison operator '{}'",
                other
            ))),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

impl FromStr for JoinType {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INNER" | "INNER JOIN" => Ok(JoinType::Inner),
            "LEFT" | "LEFT JOIN" | "LEFT OUTER" => Ok(JoinType::Left),
            other => Err(OrmError::Configuration(format!(
                "Unsupported join type '{}'",
                other
            ))),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "ASC" => Ok(OrderDirection::Asc),
            "DESC" => Ok(OrderDirection::Desc),
            other => Err(OrmError::Configuration(format!(
                "Unsupported sort direction '{}'",
                other
            ))),
        }
    }
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub direction: OrderDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse sort keys from `{"col": "DESC"}`, `["col DESC", "other"]` or `"col"`
    pub fn parse_list(value: &Value) -> OrmResult<Vec<SortKey>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(vec![Self::parse_entry(s)?]),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Self::parse_entry(s),
                    other => Err(OrmError::Configuration(format!(
                        "Invalid sort entry: {}",
                        other
                    ))),
                })
                .collect(),
            Value::Object(map) => map
                .iter()
                .map(|(column, direction)| {
                    let direction = match direction {
                        Value::String(d) => d.parse()?,
                        Value::Null => OrderDirection::Asc,
                        other => {
                            return Err(OrmError::Configuration(format!(
                                "Invalid sort direction for '{}': {}",
                                column, other
                            )))
                        }
                    };
                    Ok(SortKey {
                        column: column.clone(),
                        direction,
                    })
                })
                .collect(),
            other => Err(OrmError::Configuration(format!(
                "Invalid sort specification: {}",
                other
            ))),
        }
    }

    fn parse_entry(entry: &str) -> OrmResult<SortKey> {
        let mut parts = entry.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| OrmError::Configuration("Empty sort entry".to_string()))?;
        let direction = parts.next().unwrap_or("ASC").parse()?;
        Ok(SortKey {
            column: column.to_string(),
            direction,
        })
    }

    /// `"column DIRECTION"` entry form
    pub fn to_value(&self) -> Value {
        Value::String(format!("{} {}", self.column, self.direction))
    }

    /// Qualify an unqualified column with `alias`
    pub fn qualified(&self, alias: &str) -> SortKey {
        SortKey {
            column: qualify_column(&self.column, alias),
            direction: self.direction,
        }
    }
}

/// Prefix `column` with `alias.` unless it is already qualified
pub fn qualify_column(column: &str, alias: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", alias, column)
    }
}

/// Split `alias.column` into its parts; unqualified columns yield `None` for the alias
pub fn split_qualified(column: &str) -> (Option<&str>, &str) {
    match column.split_once('.') {
        Some((alias, name)) => (Some(alias), name),
        None => (None, column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_round_trip_through_display() {
        for op in [
            QueryOperator::Equal,
            QueryOperator::GreaterThanOrEqual,
            QueryOperator::NotLike,
        ] {
            assert_eq!(op.to_string().parse::<QueryOperator>().unwrap(), op);
        }
        assert!("~".parse::<QueryOperator>().is_err());
    }

    #[test]
    fn test_sort_key_parsing() {
        let keys = SortKey::parse_list(&json!({"article.id": "desc", "title": "ASC"})).unwrap();
        assert_eq!(keys[0], SortKey::desc("article.id"));
        assert_eq!(keys[1], SortKey::asc("title"));

        let keys = SortKey::parse_list(&json!(["id DESC", "name"])).unwrap();
        assert_eq!(keys, vec![SortKey::desc("id"), SortKey::asc("name")]);

        assert!(SortKey::parse_list(&json!({"id": "sideways"})).is_err());

        let entries: Vec<Value> = keys.iter().map(SortKey::to_value).collect();
        assert_eq!(entries, vec![json!("id DESC"), json!("name ASC")]);
        assert_eq!(SortKey::parse_list(&Value::Array(entries)).unwrap(), keys);
    }

    #[test]
    fn test_qualify_column() {
        assert_eq!(qualify_column("id", "article"), "article.id");
        assert_eq!(qualify_column("author.id", "article"), "author.id");
        assert_eq!(split_qualified("author.name"), (Some("author"), "name"));
        assert_eq!(split_qualified("name"), (None, "name"));
    }

    #[test]
    fn test_join_type_display() {
        assert_eq!(JoinType::Left.to_string(), "LEFT JOIN");
        assert_eq!("inner".parse::<JoinType>().unwrap(), JoinType::Inner);
    }
}
