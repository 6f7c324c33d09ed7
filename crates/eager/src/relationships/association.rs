//! Association descriptors - immutable relationship metadata between collections

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::inference;
use crate::error::{OrmError, OrmResult};
use crate::query::conditions::ConditionSet;
use crate::query::types::SortKey;

/// Cardinality of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// belongsTo / hasOne
    ToOne,
    /// hasMany
    ToMany,
    /// belongsToMany through a join table
    ManyToMany,
}

impl AssociationKind {
    /// Check if this association yields a list of records
    pub fn is_collection(self) -> bool {
        matches!(self, AssociationKind::ToMany | AssociationKind::ManyToMany)
    }

    /// Check if this association goes through a join table
    pub fn requires_join_table(self) -> bool {
        matches!(self, AssociationKind::ManyToMany)
    }

    /// Strategy used when neither the descriptor nor the query overrides it
    pub fn default_strategy(self) -> Strategy {
        match self {
            AssociationKind::ToOne => Strategy::Join,
            AssociationKind::ToMany | AssociationKind::ManyToMany => Strategy::Select,
        }
    }
}

/// Fetch mechanism for an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fold into the parent statement as a JOIN
    Join,
    /// Separate query with the collected parent keys in an `IN (...)` list
    Select,
    /// Separate query with the parent statement embedded as a sub-select
    Subquery,
}

impl Strategy {
    pub fn is_deferred(self) -> bool {
        !matches!(self, Strategy::Join)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Join => write!(f, "join"),
            Strategy::Select => write!(f, "select"),
            Strategy::Subquery => write!(f, "subquery"),
        }
    }
}

impl FromStr for Strategy {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "join" => Ok(Strategy::Join),
            "select" => Ok(Strategy::Select),
            "subquery" => Ok(Strategy::Subquery),
            other => Err(OrmError::Configuration(format!(
                "Unknown association strategy '{}'",
                other
            ))),
        }
    }
}

/// Which collection stores the foreign key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeySide {
    /// The source holds the key (belongsTo)
    Source,
    /// The target holds the key (hasOne, hasMany), or the join table for many-to-many
    Target,
}

/// Join table of a many-to-many association
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTable {
    /// Collection alias and record sub-key, e.g. `ArticlesTag`
    pub collection: String,
    /// Physical table, e.g. `articles_tags`
    pub table: String,
    /// Column referencing the source key, e.g. `article_id`
    pub source_foreign_key: String,
    /// Column referencing the target key, e.g. `tag_id`
    pub target_foreign_key: String,
}

impl JoinTable {
    pub fn new(
        collection: impl Into<String>,
        table: impl Into<String>,
        source_foreign_key: impl Into<String>,
        target_foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            table: table.into(),
            source_foreign_key: source_foreign_key.into(),
            target_foreign_key: target_foreign_key.into(),
        }
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.table.is_empty() || self.collection.is_empty() {
            return Err(OrmError::Configuration(
                "Join table name and alias cannot be empty".to_string(),
            ));
        }
        if self.source_foreign_key.is_empty() || self.target_foreign_key.is_empty() {
            return Err(OrmError::Configuration(
                "Join table foreign keys cannot be empty".to_string(),
            ));
        }
        if self.source_foreign_key == self.target_foreign_key {
            return Err(OrmError::Configuration(
                "Join table foreign keys must be different".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable description of one association
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationDescriptor {
    /// Association name, also the join alias
    pub name: String,
    pub kind: AssociationKind,
    /// Owning collection
    pub source: String,
    /// Related collection
    pub target: String,
    /// Column on the source compared against `target_key`
    pub source_key: String,
    /// Column on the target compared against `source_key`
    pub target_key: String,
    pub foreign_key_side: ForeignKeySide,
    pub join_table: Option<JoinTable>,
    pub strategy: Strategy,
    /// Record property holding the related data
    pub property: String,
    /// Joined as INNER when true
    pub required: bool,
    /// Conditions applied whenever the association is loaded
    pub conditions: ConditionSet,
    /// Default order of loaded records
    pub sort: Vec<SortKey>,
}

impl AssociationDescriptor {
    /// belongsTo: `source.<target>_id = target.id`
    pub fn belongs_to(source: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AssociationKind::ToOne,
            source: source.to_string(),
            target: name.to_string(),
            source_key: inference::foreign_key(name),
            target_key: "id".to_string(),
            foreign_key_side: ForeignKeySide::Source,
            join_table: None,
            strategy: Strategy::Join,
            property: name.to_string(),
            required: false,
            conditions: ConditionSet::new(),
            sort: Vec::new(),
        }
    }

    /// hasOne: `source.id = target.<source>_id`, joined INNER unless marked optional
    pub fn has_one(source: &str, name: &str) -> Self {
        Self {
            kind: AssociationKind::ToOne,
            source_key: "id".to_string(),
            target_key: inference::foreign_key(source),
            foreign_key_side: ForeignKeySide::Target,
            required: true,
            ..Self::belongs_to(source, name)
        }
    }

    /// hasMany: `source.id = target.<source>_id`, loaded separately by default
    pub fn has_many(source: &str, name: &str) -> Self {
        Self {
            kind: AssociationKind::ToMany,
            strategy: Strategy::Select,
            property: inference::collection_property(name),
            required: false,
            ..Self::has_one(source, name)
        }
    }

    /// belongsToMany through the conventional join table
    pub fn belongs_to_many(source: &str, name: &str) -> Self {
        let table = inference::join_table_name(source, name);
        let join_table = JoinTable::new(
            inference::join_alias(&table),
            table,
            inference::foreign_key(source),
            inference::foreign_key(name),
        );
        Self {
            name: name.to_string(),
            kind: AssociationKind::ManyToMany,
            source: source.to_string(),
            target: name.to_string(),
            source_key: "id".to_string(),
            target_key: "id".to_string(),
            foreign_key_side: ForeignKeySide::Target,
            join_table: Some(join_table),
            strategy: Strategy::Select,
            property: inference::collection_property(name),
            required: false,
            conditions: ConditionSet::new(),
            sort: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    /// Replace the foreign key column on whichever side holds it
    pub fn with_foreign_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        match (&mut self.join_table, self.foreign_key_side) {
            (Some(join_table), _) => join_table.source_foreign_key = column,
            (None, ForeignKeySide::Source) => self.source_key = column,
            (None, ForeignKeySide::Target) => self.target_key = column,
        }
        self
    }

    /// Replace the referenced (non foreign key) column
    pub fn with_binding_key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        match (self.kind, self.foreign_key_side) {
            (AssociationKind::ManyToMany, _) | (_, ForeignKeySide::Target) => {
                self.source_key = column
            }
            (_, ForeignKeySide::Source) => self.target_key = column,
        }
        self
    }

    pub fn with_join_table(mut self, join_table: JoinTable) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Apply deserialized options on top of the conventional defaults
    pub fn with_options(mut self, options: AssociationOptions) -> OrmResult<Self> {
        for key in options.extra.keys() {
            tracing::warn!(
                association = %self.name,
                option = %key,
                "Ignoring unknown association option"
            );
        }

        if let Some(target) = options.class_name {
            self.target = target;
        }
        if let Some(property) = options.property {
            self.property = property;
        }
        if let Some(strategy) = options.strategy {
            self.strategy = strategy;
        }
        if let Some(required) = options.required {
            self.required = required;
        }
        if let Some(binding_key) = options.binding_key {
            self = self.with_binding_key(binding_key);
        }
        if let Some(ref conditions) = options.conditions {
            self.conditions = ConditionSet::from_value(conditions)?;
        }
        if let Some(ref sort) = options.sort {
            self.sort = SortKey::parse_list(sort)?;
        }

        if let Some(join_table) = self.join_table.as_mut() {
            if let Some(table) = options.join_table {
                join_table.collection = options
                    .through
                    .clone()
                    .unwrap_or_else(|| inference::join_alias(&table));
                join_table.table = table;
            } else if let Some(through) = options.through {
                join_table.table = inference::table_name(&through);
                join_table.collection = through;
            }
            if let Some(target_foreign_key) = options.target_foreign_key {
                join_table.target_foreign_key = target_foreign_key;
            }
        } else if options.join_table.is_some() || options.through.is_some() {
            return Err(OrmError::Configuration(format!(
                "Association '{}' has no join table",
                self.name
            )));
        }

        if let Some(foreign_key) = options.foreign_key {
            self = self.with_foreign_key(foreign_key);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate descriptor consistency
    pub fn validate(&self) -> OrmResult<()> {
        if self.name.is_empty() {
            return Err(OrmError::Configuration(
                "Association name cannot be empty".to_string(),
            ));
        }
        if self.target.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Association '{}' has no target collection",
                self.name
            )));
        }
        if self.source_key.is_empty() || self.target_key.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Association '{}' has an empty key column",
                self.name
            )));
        }
        if self.property.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Association '{}' has an empty property name",
                self.name
            )));
        }
        match (&self.join_table, self.kind.requires_join_table()) {
            (Some(join_table), true) => join_table.validate()?,
            (None, true) => {
                return Err(OrmError::Configuration(format!(
                    "Many-to-many association '{}' requires a join table",
                    self.name
                )))
            }
            (Some(_), false) => {
                return Err(OrmError::Configuration(format!(
                    "Association '{}' cannot declare a join table",
                    self.name
                )))
            }
            (None, false) => {}
        }
        Ok(())
    }

    /// Column on the source the owner keys are read from
    pub fn owner_key(&self) -> &str {
        &self.source_key
    }

    /// Column on the target (or join table) matched against the owner keys
    pub fn match_key(&self) -> &str {
        match &self.join_table {
            Some(join_table) => &join_table.source_foreign_key,
            None => &self.target_key,
        }
    }
}

/// Options accepted when registering an association
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationOptions {
    pub class_name: Option<String>,
    pub property: Option<String>,
    pub foreign_key: Option<String>,
    pub binding_key: Option<String>,
    pub strategy: Option<Strategy>,
    pub join_table: Option<String>,
    pub through: Option<String>,
    pub target_foreign_key: Option<String>,
    pub required: Option<bool>,
    pub conditions: Option<Value>,
    pub sort: Option<Value>,
    /// Unrecognized keys, ignored with a warning
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> OrmResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn binding_key(mut self, column: impl Into<String>) -> Self {
        self.binding_key = Some(column.into());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn through(mut self, collection: impl Into<String>) -> Self {
        self.through = Some(collection.into());
        self
    }

    pub fn target_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.target_foreign_key = Some(column.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }
}
