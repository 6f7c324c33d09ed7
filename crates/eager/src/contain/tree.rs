//! Containment tree - the normalized eager-load request of a query

use serde_json::{Map, Value};

use crate::error::{OrmError, OrmResult};
use crate::query::conditions::ConditionSet;
use crate::query::types::SortKey;
use crate::relationships::association::Strategy;

/// Projection requested for a contained association
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldSelection {
    /// Every declared field of the target
    #[default]
    All,
    /// Only the key columns needed for assembly
    None,
    /// Listed fields, projected verbatim
    Explicit(Vec<String>),
}

impl FieldSelection {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Null | Value::Bool(true) => Ok(FieldSelection::All),
            Value::Bool(false) => Ok(FieldSelection::None),
            Value::String(field) => Ok(FieldSelection::Explicit(vec![field.clone()])),
            Value::Array(items) if items.is_empty() => Ok(FieldSelection::None),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(field) => Ok(field.clone()),
                    other => Err(OrmError::Configuration(format!(
                        "Invalid field name in contain: {}",
                        other
                    ))),
                })
                .collect::<OrmResult<Vec<_>>>()
                .map(FieldSelection::Explicit),
            other => Err(OrmError::Configuration(format!(
                "Invalid 'fields' option in contain: {}",
                other
            ))),
        }
    }
}

/// Per-node options; `None` means "not given", so merges only touch what a call names
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainOptions {
    pub fields: Option<FieldSelection>,
    pub conditions: Option<ConditionSet>,
    pub sort: Option<Vec<SortKey>>,
    pub strategy: Option<Strategy>,
    pub foreign_key: Option<String>,
    pub matching: Option<bool>,
}

impl ContainOptions {
    fn merge(&mut self, other: &ContainOptions) {
        if other.fields.is_some() {
            self.fields = other.fields.clone();
        }
        if other.conditions.is_some() {
            self.conditions = other.conditions.clone();
        }
        if other.sort.is_some() {
            self.sort = other.sort.clone();
        }
        if other.strategy.is_some() {
            self.strategy = other.strategy;
        }
        if other.foreign_key.is_some() {
            self.foreign_key = other.foreign_key.clone();
        }
        if other.matching.is_some() {
            self.matching = other.matching;
        }
    }
}

const OPTION_KEYS: [&str; 6] = ["fields", "conditions", "sort", "strategy", "foreignKey", "matching"];

/// One association in the containment tree
#[derive(Debug, Clone, PartialEq)]
pub struct ContainNode {
    pub name: String,
    pub options: ContainOptions,
    pub children: Vec<ContainNode>,
}

impl ContainNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ContainOptions::default(),
            children: Vec::new(),
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.options.fields = Some(if fields.is_empty() {
            FieldSelection::None
        } else {
            FieldSelection::Explicit(fields)
        });
        self
    }

    /// Project only the key columns of this association
    pub fn no_fields(mut self) -> Self {
        self.options.fields = Some(FieldSelection::None);
        self
    }

    pub fn conditions(mut self, conditions: ConditionSet) -> Self {
        self.options.conditions = Some(conditions);
        self
    }

    pub fn sort(mut self, sort: Vec<SortKey>) -> Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.options.strategy = Some(strategy);
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.options.foreign_key = Some(column.into());
        self
    }

    pub fn matching(mut self, matching: bool) -> Self {
        self.options.matching = Some(matching);
        self
    }

    pub fn contain(mut self, child: ContainNode) -> Self {
        merge_nodes(&mut self.children, vec![child]);
        self
    }

    pub fn field_selection(&self) -> &FieldSelection {
        self.options.fields.as_ref().unwrap_or(&FieldSelection::All)
    }

    pub fn is_matching(&self) -> bool {
        self.options.matching.unwrap_or(false)
    }

    pub fn child(&self, name: &str) -> Option<&ContainNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Parse `name => value` where value is null, a list of children or an option map
    pub fn from_value(name: &str, value: &Value) -> OrmResult<Self> {
        let mut node = ContainNode::new(name);
        match value {
            Value::Null => {}
            Value::String(child) => merge_nodes(&mut node.children, vec![ContainNode::new(child)]),
            Value::Array(_) => merge_nodes(&mut node.children, parse_nodes(value)?),
            Value::Object(map) => node.apply_map(map)?,
            other => {
                return Err(OrmError::Configuration(format!(
                    "Invalid contain specification for '{}': {}",
                    name, other
                )))
            }
        }
        Ok(node)
    }

    fn apply_map(&mut self, map: &Map<String, Value>) -> OrmResult<()> {
        for (key, value) in map {
            match key.as_str() {
                "fields" => self.options.fields = Some(FieldSelection::from_value(value)?),
                "conditions" => self.options.conditions = Some(ConditionSet::from_value(value)?),
                "sort" => self.options.sort = Some(SortKey::parse_list(value)?),
                "strategy" => {
                    let strategy = value.as_str().ok_or_else(|| {
                        OrmError::Configuration(format!("Invalid strategy for '{}': {}", self.name, value))
                    })?;
                    self.options.strategy = Some(strategy.parse()?);
                }
                "foreignKey" => {
                    let column = value.as_str().ok_or_else(|| {
                        OrmError::Configuration(format!("Invalid foreignKey for '{}': {}", self.name, value))
                    })?;
                    self.options.foreign_key = Some(column.to_string());
                }
                "matching" => {
                    let matching = value.as_bool().ok_or_else(|| {
                        OrmError::Configuration(format!("Invalid matching flag for '{}': {}", self.name, value))
                    })?;
                    self.options.matching = Some(matching);
                }
                _ => match value {
                    Value::Null | Value::Array(_) | Value::Object(_) => {
                        merge_nodes(&mut self.children, vec![ContainNode::from_value(key, value)?]);
                    }
                    _ => {
                        tracing::warn!(
                            association = %self.name,
                            option = %key,
                            known = ?OPTION_KEYS,
                            "Ignoring unknown contain option"
                        );
                    }
                },
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: ContainNode) {
        self.options.merge(&other.options);
        merge_nodes(&mut self.children, other.children);
    }

    /// Nesting depth of this node, counting itself
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(ContainNode::depth).max().unwrap_or(0)
    }

    /// Plain JSON form of this node's options and children
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(fields) = &self.options.fields {
            let value = match fields {
                FieldSelection::All => Value::Bool(true),
                FieldSelection::None => Value::Bool(false),
                FieldSelection::Explicit(list) => {
                    Value::Array(list.iter().cloned().map(Value::String).collect())
                }
            };
            map.insert("fields".to_string(), value);
        }
        if let Some(conditions) = &self.options.conditions {
            map.insert("conditions".to_string(), conditions.to_value());
        }
        if let Some(sort) = &self.options.sort {
            map.insert("sort".to_string(), Value::Array(sort.iter().map(SortKey::to_value).collect()));
        }
        if let Some(strategy) = self.options.strategy {
            map.insert("strategy".to_string(), Value::String(strategy.to_string()));
        }
        if let Some(foreign_key) = &self.options.foreign_key {
            map.insert("foreignKey".to_string(), Value::String(foreign_key.clone()));
        }
        if let Some(matching) = self.options.matching {
            map.insert("matching".to_string(), Value::Bool(matching));
        }
        for child in &self.children {
            map.insert(child.name.clone(), child.to_value());
        }
        Value::Object(map)
    }
}

/// Parse a top level contain value: a name, a list of names and maps, or a map of names
pub fn parse_nodes(value: &Value) -> OrmResult<Vec<ContainNode>> {
    let mut nodes = Vec::new();
    match value {
        Value::Null => {}
        Value::String(name) => nodes.push(ContainNode::new(name)),
        Value::Array(items) => {
            for item in items {
                let parsed = match item {
                    Value::String(name) => vec![ContainNode::new(name)],
                    Value::Object(_) => parse_nodes(item)?,
                    other => {
                        return Err(OrmError::Configuration(format!(
                            "Invalid contain entry: {}",
                            other
                        )))
                    }
                };
                merge_nodes(&mut nodes, parsed);
            }
        }
        Value::Object(map) => {
            for (name, options) in map {
                merge_nodes(&mut nodes, vec![ContainNode::from_value(name, options)?]);
            }
        }
        other => {
            return Err(OrmError::Configuration(format!(
                "Invalid contain specification: {}",
                other
            )))
        }
    }
    Ok(nodes)
}

fn merge_nodes(existing: &mut Vec<ContainNode>, incoming: Vec<ContainNode>) {
    for node in incoming {
        match existing.iter_mut().find(|current| current.name == node.name) {
            Some(current) => current.merge(node),
            None => existing.push(node),
        }
    }
}

/// Root of a query's containment request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainTree {
    nodes: Vec<ContainNode>,
}

impl ContainTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<ContainNode>) -> Self {
        let mut tree = Self::new();
        tree.merge(nodes);
        tree
    }

    /// Accumulate nodes; options given again overwrite only themselves
    pub fn merge(&mut self, nodes: Vec<ContainNode>) {
        merge_nodes(&mut self.nodes, nodes);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn nodes(&self) -> &[ContainNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ContainNode> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn depth(&self) -> usize {
        self.nodes.iter().map(ContainNode::depth).max().unwrap_or(0)
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .nodes
            .iter()
            .map(|node| (node.name.clone(), node.to_value()))
            .collect();
        Value::Object(map)
    }
}

/// Anything `Query::contain` accepts
pub trait IntoContain {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>>;
}

impl IntoContain for &str {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        Ok(vec![ContainNode::new(self)])
    }
}

impl IntoContain for String {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        Ok(vec![ContainNode::new(self)])
    }
}

impl IntoContain for Vec<&str> {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        Ok(self.into_iter().map(ContainNode::new).collect())
    }
}

impl IntoContain for ContainNode {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        Ok(vec![self])
    }
}

impl IntoContain for Vec<ContainNode> {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        Ok(self)
    }
}

impl IntoContain for Value {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        parse_nodes(&self)
    }
}

impl IntoContain for &Value {
    fn into_contain(self) -> OrmResult<Vec<ContainNode>> {
        parse_nodes(self)
    }
}
