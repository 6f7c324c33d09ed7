//! Bulk query options

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrmResult;

/// Options accepted by [`Query::apply_options`](super::Query::apply_options)
///
/// Recognized keys map onto builder calls; every other key lands in `extra`
/// and is kept verbatim on the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub having: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contain: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> OrmResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order(mut self, order: Value) -> Self {
        self.order = Some(order);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn group<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn having(mut self, having: Value) -> Self {
        self.having = Some(having);
        self
    }

    pub fn contain(mut self, contain: Value) -> Self {
        self.contain = Some(contain);
        self
    }

    pub fn join(mut self, join: Value) -> Self {
        self.join = Some(join);
        self
    }

    /// Store an unrecognized option
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
