//! Predicate conditions for WHERE, HAVING and JOIN ON clauses

use serde_json::Value;

use super::plan::SelectPlan;
use super::types::{qualify_column, QueryOperator};
use crate::backends::SqlDialect;
use crate::error::{OrmError, OrmResult};

/// A single predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column <op> value`
    Compare {
        column: String,
        operator: QueryOperator,
        value: Value,
    },
    /// `left <op> right`, both sides are columns
    Columns {
        left: String,
        operator: QueryOperator,
        right: String,
    },
    /// `column [NOT] IN (values)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IN (SELECT ...)`
    InSubquery {
        column: String,
        subquery: Box<SelectPlan>,
    },
    /// `column IS [NOT] NULL`
    IsNull { column: String, negated: bool },
    /// Verbatim SQL fragment
    Raw(String),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            operator: QueryOperator::Equal,
            value: value.into(),
        }
    }

    pub fn compare(column: impl Into<String>, operator: QueryOperator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn columns(left: impl Into<String>, right: impl Into<String>) -> Self {
        Condition::Columns {
            left: left.into(),
            operator: QueryOperator::Equal,
            right: right.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            column: column.into(),
            values,
            negated: false,
        }
    }

    pub fn in_subquery(column: impl Into<String>, subquery: SelectPlan) -> Self {
        Condition::InSubquery {
            column: column.into(),
            subquery: Box::new(subquery),
        }
    }

    /// Parse one `"column [op]" => value` entry of a condition map
    pub fn from_entry(key: &str, value: &Value) -> OrmResult<Self> {
        let key = key.trim();
        let (column, operator) = match key.split_once(char::is_whitespace) {
            Some((column, op)) => (column.to_string(), Some(op.trim().to_uppercase())),
            None => (key.to_string(), None),
        };

        match (operator.as_deref(), value) {
            (None | Some("IS"), Value::Null) => Ok(Condition::IsNull {
                column,
                negated: false,
            }),
            (Some("IS NOT") | Some("!="), Value::Null) => Ok(Condition::IsNull {
                column,
                negated: true,
            }),
            (None | Some("IN"), Value::Array(values)) => Ok(Condition::In {
                column,
                values: values.clone(),
                negated: false,
            }),
            (Some("NOT IN"), Value::Array(values)) => Ok(Condition::In {
                column,
                values: values.clone(),
                negated: true,
            }),
            (None, value) => Ok(Condition::eq(column, value.clone())),
            (Some(op), value) => Ok(Condition::Compare {
                column,
                operator: op.parse()?,
                value: value.clone(),
            }),
        }
    }

    /// Parse a bare string predicate; `a > b` between two identifiers becomes a column comparison
    pub fn from_raw(expression: &str) -> Self {
        let tokens: Vec<&str> = expression.split_whitespace().collect();
        if tokens.len() == 3 && is_identifier(tokens[0]) && is_identifier(tokens[2]) {
            if let Ok(operator) = tokens[1].parse::<QueryOperator>() {
                return Condition::Columns {
                    left: tokens[0].to_string(),
                    operator,
                    right: tokens[2].to_string(),
                };
            }
        }
        Condition::Raw(expression.to_string())
    }

    /// Condition-map form accepted by [`ConditionSet::from_value`]
    pub fn to_value(&self) -> Value {
        let entry = |key: String, value: Value| {
            let mut map = serde_json::Map::new();
            map.insert(key, value);
            Value::Object(map)
        };
        match self {
            Condition::Compare {
                column,
                operator: QueryOperator::Equal,
                value,
            } => entry(column.clone(), value.clone()),
            Condition::Compare {
                column,
                operator,
                value,
            } => entry(format!("{} {}", column, operator), value.clone()),
            Condition::Columns {
                left,
                operator,
                right,
            } => Value::String(format!("{} {} {}", left, operator, right)),
            Condition::In {
                column,
                values,
                negated,
            } => {
                let key = if *negated {
                    format!("{} NOT IN", column)
                } else {
                    format!("{} IN", column)
                };
                entry(key, Value::Array(values.clone()))
            }
            Condition::InSubquery { column, subquery } => {
                let (sql, _) = subquery.to_sql(SqlDialect::PostgreSQL);
                Value::String(format!("{} IN ({})", column, sql))
            }
            Condition::IsNull { column, negated: false } => entry(column.clone(), Value::Null),
            Condition::IsNull { column, negated: true } => entry(format!("{} IS NOT", column), Value::Null),
            Condition::Raw(sql) => Value::String(sql.clone()),
        }
    }

    /// Prefix unqualified column references with `alias`
    pub fn qualified(&self, alias: &str) -> Condition {
        match self {
            Condition::Compare {
                column,
                operator,
                value,
            } => Condition::Compare {
                column: qualify_column(column, alias),
                operator: *operator,
                value: value.clone(),
            },
            Condition::Columns {
                left,
                operator,
                right,
            } => Condition::Columns {
                left: qualify_column(left, alias),
                operator: *operator,
                right: qualify_column(right, alias),
            },
            Condition::In {
                column,
                values,
                negated,
            } => Condition::In {
                column: qualify_column(column, alias),
                values: values.clone(),
                negated: *negated,
            },
            Condition::InSubquery { column, subquery } => Condition::InSubquery {
                column: qualify_column(column, alias),
                subquery: subquery.clone(),
            },
            Condition::IsNull { column, negated } => Condition::IsNull {
                column: qualify_column(column, alias),
                negated: *negated,
            },
            Condition::Raw(sql) => Condition::Raw(sql.clone()),
        }
    }
}

fn is_identifier(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !token.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true)
}

/// Conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a condition map (`{"field >": 100}`), a list of maps and strings, or a raw string
    pub fn from_value(value: &Value) -> OrmResult<Self> {
        let mut set = ConditionSet::new();
        set.extend_from_value(value)?;
        Ok(set)
    }

    pub fn extend_from_value(&mut self, value: &Value) -> OrmResult<()> {
        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (key, value) in map {
                    self.conditions.push(Condition::from_entry(key, value)?);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.extend_from_value(item)?;
                }
            }
            Value::String(expression) => self.conditions.push(Condition::from_raw(expression)),
            other => {
                return Err(OrmError::Configuration(format!(
                    "Invalid condition specification: {}",
                    other
                )))
            }
        }
        Ok(())
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn merge(&mut self, other: &ConditionSet) {
        self.conditions.extend(other.conditions.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    /// List of condition maps and strings, parseable again by [`ConditionSet::from_value`]
    pub fn to_value(&self) -> Value {
        Value::Array(self.conditions.iter().map(Condition::to_value).collect())
    }

    /// Copy with every unqualified column prefixed by `alias`
    pub fn qualified(&self, alias: &str) -> ConditionSet {
        ConditionSet {
            conditions: self.conditions.iter().map(|c| c.qualified(alias)).collect(),
        }
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_condition_map() {
        let set = ConditionSet::from_value(&json!({
            "field_a": 1,
            "field_b": "something",
            "field_c >": 100,
            "field_d": [1, 2],
            "field_e": null
        }))
        .unwrap();

        let conditions: Vec<_> = set.iter().cloned().collect();
        assert_eq!(conditions[0], Condition::eq("field_a", 1));
        assert_eq!(conditions[1], Condition::eq("field_b", "something"));
        assert_eq!(
            conditions[2],
            Condition::compare("field_c", QueryOperator::GreaterThan, 100)
        );
        assert_eq!(conditions[3], Condition::is_in("field_d", vec![json!(1), json!(2)]));
        assert_eq!(
            conditions[4],
            Condition::IsNull {
                column: "field_e".to_string(),
                negated: false
            }
        );
    }

    #[test]
    fn test_raw_condition_between_columns() {
        let set = ConditionSet::from_value(&json!(["a > b", "COUNT(*) > 1"])).unwrap();
        let conditions: Vec<_> = set.iter().cloned().collect();
        assert_eq!(
            conditions[0],
            Condition::Columns {
                left: "a".to_string(),
                operator: QueryOperator::GreaterThan,
                right: "b".to_string()
            }
        );
        assert_eq!(conditions[1], Condition::Raw("COUNT(*) > 1".to_string()));
    }

    #[test]
    fn test_qualified_leaves_dotted_columns() {
        let set = ConditionSet::from_value(&json!({"id": 2, "author.name": "larry"})).unwrap();
        let qualified = set.qualified("article");
        let conditions: Vec<_> = qualified.iter().cloned().collect();
        assert_eq!(conditions[0], Condition::eq("article.id", 2));
        assert_eq!(conditions[1], Condition::eq("author.name", "larry"));
    }

    #[test]
    fn test_to_value_parses_back() {
        let set = ConditionSet::from_value(&json!([
            {"id": 2, "title LIKE": "%Art%", "author_id IN": [1, 3], "body IS NOT": null},
            "article.author_id = author.id",
            "COUNT(*) > 1"
        ]))
        .unwrap();

        assert_eq!(
            set.to_value(),
            json!([
                {"id": 2},
                {"title LIKE": "%Art%"},
                {"author_id IN": [1, 3]},
                {"body IS NOT": null},
                "article.author_id = author.id",
                "COUNT(*) > 1"
            ])
        );
        assert_eq!(ConditionSet::from_value(&set.to_value()).unwrap(), set);
    }

    #[test]
    fn test_invalid_operator_is_rejected() {
        assert!(ConditionSet::from_value(&json!({"id ~~": 1})).is_err());
        assert!(ConditionSet::from_value(&json!(42)).is_err());
    }
}
