//! Collections and the registry holding them
//!
//! The registry doubles as the schema service (`fields`) and the association
//! registry (`descriptors_of`). It is an explicit, cloneable handle; clones share
//! the same storage and `clear()` tears everything down.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};
use crate::hydration::EntityFactory;
use crate::relationships::association::{AssociationDescriptor, AssociationOptions};
use crate::relationships::inference;

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Datetime,
    Json,
}

/// Declared column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A named collection backed by one table
#[derive(Clone)]
pub struct Collection {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub primary_key: String,
    pub factory: Option<Arc<dyn EntityFactory>>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("primary_key", &self.primary_key)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

impl Collection {
    /// Collection with the conventional table name and an `id` primary key
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: inference::table_name(&name),
            name,
            fields: Vec::new(),
            primary_key: "id".to_string(),
            factory: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(name, ty)| FieldDef::new(name, ty)));
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn entity_factory(mut self, factory: Arc<dyn EntityFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn has_declared_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    /// Fail when fields are declared and `column` is not one of them
    pub fn check_column(&self, column: &str, association: &str) -> OrmResult<()> {
        if self.has_declared_fields() && !self.has_field(column) {
            return Err(OrmError::Configuration(format!(
                "Association '{}' references column '{}' which collection '{}' does not declare",
                association, column, self.name
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.name.is_empty() || self.table.is_empty() {
            return Err(OrmError::Configuration(
                "Collection name and table cannot be empty".to_string(),
            ));
        }
        self.check_column(&self.primary_key, &self.name)
    }
}

/// Thread-safe registry of collections and their associations
#[derive(Clone, Default)]
pub struct Registry {
    collections: Arc<DashMap<String, Arc<Collection>>>,
    associations: Arc<DashMap<String, Vec<Arc<AssociationDescriptor>>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("collections", &self.collections.len())
            .field("associations", &self.associations.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a collection
    pub fn register(&self, collection: Collection) -> OrmResult<()> {
        collection.validate()?;
        tracing::debug!(collection = %collection.name, table = %collection.table, "Registering collection");
        self.collections
            .insert(collection.name.clone(), Arc::new(collection));
        Ok(())
    }

    pub fn collection(&self, name: &str) -> OrmResult<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrmError::UnknownCollection(name.to_string()))
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Declared fields of a collection, in declaration order
    pub fn fields(&self, name: &str) -> OrmResult<Vec<FieldDef>> {
        Ok(self.collection(name)?.fields.clone())
    }

    pub fn entity_factory(&self, name: &str) -> Option<Arc<dyn EntityFactory>> {
        self.collections
            .get(name)
            .and_then(|entry| entry.value().factory.clone())
    }

    /// Associations declared on a collection, in registration order
    pub fn descriptors_of(&self, name: &str) -> Vec<Arc<AssociationDescriptor>> {
        self.associations
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn association(&self, source: &str, name: &str) -> Option<Arc<AssociationDescriptor>> {
        self.associations.get(source).and_then(|entry| {
            entry
                .value()
                .iter()
                .find(|descriptor| descriptor.name == name)
                .cloned()
        })
    }

    /// Register a descriptor, replacing any association with the same name
    pub fn add_association(&self, descriptor: AssociationDescriptor) -> OrmResult<Arc<AssociationDescriptor>> {
        descriptor.validate()?;
        self.check_keys(&descriptor)?;

        tracing::debug!(
            source = %descriptor.source,
            association = %descriptor.name,
            target = %descriptor.target,
            kind = ?descriptor.kind,
            "Registering association"
        );

        let descriptor = Arc::new(descriptor);
        let mut entry = self
            .associations
            .entry(descriptor.source.clone())
            .or_insert_with(Vec::new);
        entry.retain(|existing| existing.name != descriptor.name);
        entry.push(descriptor.clone());
        Ok(descriptor)
    }

    pub fn belongs_to(&self, source: &str, target: &str, options: AssociationOptions) -> OrmResult<Arc<AssociationDescriptor>> {
        let descriptor = AssociationDescriptor::belongs_to(source, target).with_options(options)?;
        self.add_association(descriptor)
    }

    pub fn has_one(&self, source: &str, target: &str, options: AssociationOptions) -> OrmResult<Arc<AssociationDescriptor>> {
        let descriptor = AssociationDescriptor::has_one(source, target).with_options(options)?;
        self.add_association(descriptor)
    }

    pub fn has_many(&self, source: &str, target: &str, options: AssociationOptions) -> OrmResult<Arc<AssociationDescriptor>> {
        let descriptor = AssociationDescriptor::has_many(source, target).with_options(options)?;
        self.add_association(descriptor)
    }

    pub fn belongs_to_many(&self, source: &str, target: &str, options: AssociationOptions) -> OrmResult<Arc<AssociationDescriptor>> {
        let descriptor = AssociationDescriptor::belongs_to_many(source, target).with_options(options)?;
        self.add_association(descriptor)
    }

    /// Check descriptor keys against the declared fields of every known collection
    pub fn check_keys(&self, descriptor: &AssociationDescriptor) -> OrmResult<()> {
        let source = self.collections.get(&descriptor.source).map(|e| e.value().clone());
        let target = self.collections.get(&descriptor.target).map(|e| e.value().clone());

        if let Some(source) = &source {
            source.check_column(&descriptor.source_key, &descriptor.name)?;
        }
        if let Some(target) = &target {
            target.check_column(&descriptor.target_key, &descriptor.name)?;
        }

        if let Some(join_table) = &descriptor.join_table {
            if let Some(pivot) = self.collections.get(&join_table.collection) {
                pivot.check_column(&join_table.source_foreign_key, &descriptor.name)?;
                pivot.check_column(&join_table.target_foreign_key, &descriptor.name)?;
            }
        }

        Ok(())
    }

    /// Remove every collection and association
    pub fn clear(&self) {
        self.collections.clear();
        self.associations.clear();
    }
}
