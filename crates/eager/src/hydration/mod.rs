//! Hydration - materializing assembled records into entities
//!
//! Every collection may carry an [`EntityFactory`]. The [`Hydrator`] walks an
//! assembled record alongside its [`HydrationShape`], builds nested branches
//! first with their own collection's factory, then hands the finished
//! properties to the owning collection's factory.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::OrmResult;
use crate::schema::Registry;

/// One property of an entity
#[derive(Debug, Clone)]
pub enum Property {
    Value(Value),
    Entity(Arc<dyn Entity>),
    Entities(Vec<Arc<dyn Entity>>),
    Null,
}

impl Property {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Property::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Arc<dyn Entity>> {
        match self {
            Property::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_entities(&self) -> Option<&[Arc<dyn Entity>]> {
        match self {
            Property::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null)
    }

    /// Plain JSON form, recursing into nested entities
    pub fn to_value(&self) -> Value {
        match self {
            Property::Value(value) => value.clone(),
            Property::Entity(entity) => entity.to_value(),
            Property::Entities(entities) => {
                Value::Array(entities.iter().map(|e| e.to_value()).collect())
            }
            Property::Null => Value::Null,
        }
    }
}

/// Ordered property list handed to an entity factory
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(String, Property)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, property: Property) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = property,
            None => self.entries.push((name, property)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, property)| property)
    }

    /// Remove a property, keeping the order of the others
    pub fn take(&mut self, name: &str) -> Option<Property> {
        let index = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.entries.iter().map(|(name, property)| (name.as_str(), property))
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(name, property)| (name.clone(), property.to_value()))
            .collect();
        Value::Object(map)
    }
}

/// Hydrated domain object
pub trait Entity: fmt::Debug + Send + Sync {
    /// Collection the entity was built for
    fn source(&self) -> &str;

    fn get(&self, property: &str) -> Option<&Property>;

    /// Property names in record order
    fn properties(&self) -> Vec<&str>;

    /// Plain JSON form of the entity
    fn to_value(&self) -> Value;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Entity {
    /// Scalar value of `property`, if it holds one
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.get(property).and_then(Property::as_value)
    }

    pub fn downcast_ref<T: Entity + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Entity used when a collection has no factory of its own
#[derive(Debug, Clone)]
pub struct GenericEntity {
    source: String,
    properties: PropertyMap,
}

impl GenericEntity {
    pub fn new(source: impl Into<String>, properties: PropertyMap) -> Self {
        Self {
            source: source.into(),
            properties,
        }
    }
}

impl Entity for GenericEntity {
    fn source(&self) -> &str {
        &self.source
    }

    fn get(&self, property: &str) -> Option<&Property> {
        self.properties.get(property)
    }

    fn properties(&self) -> Vec<&str> {
        self.properties.names()
    }

    fn to_value(&self) -> Value {
        self.properties.to_value()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds entities for one collection
pub trait EntityFactory: Send + Sync {
    fn build(&self, collection: &str, properties: PropertyMap) -> OrmResult<Arc<dyn Entity>>;
}

impl<F> EntityFactory for F
where
    F: Fn(&str, PropertyMap) -> OrmResult<Arc<dyn Entity>> + Send + Sync,
{
    fn build(&self, collection: &str, properties: PropertyMap) -> OrmResult<Arc<dyn Entity>> {
        self(collection, properties)
    }
}

/// Factory producing [`GenericEntity`] values
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntityFactory;

impl EntityFactory for DefaultEntityFactory {
    fn build(&self, collection: &str, properties: PropertyMap) -> OrmResult<Arc<dyn Entity>> {
        Ok(Arc::new(GenericEntity::new(collection, properties)))
    }
}

/// Collection layout of an assembled record: which properties are nested
/// records and which collection they belong to
#[derive(Debug, Clone, PartialEq)]
pub struct HydrationShape {
    pub collection: String,
    pub children: Vec<(String, HydrationShape)>,
}

impl HydrationShape {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, property: impl Into<String>, shape: HydrationShape) -> Self {
        self.children.push((property.into(), shape));
        self
    }

    pub fn child(&self, property: &str) -> Option<&HydrationShape> {
        self.children
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, shape)| shape)
    }
}

/// Applies collection factories recursively through a record
#[derive(Clone)]
pub struct Hydrator {
    registry: Registry,
    shape: HydrationShape,
}

impl fmt::Debug for Hydrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hydrator").field("shape", &self.shape).finish()
    }
}

impl Hydrator {
    pub fn new(registry: Registry, shape: HydrationShape) -> Self {
        Self { registry, shape }
    }

    pub fn shape(&self) -> &HydrationShape {
        &self.shape
    }

    /// Hydrate one record; non-object values are returned as `None`
    pub fn hydrate(&self, record: &Value) -> OrmResult<Option<Arc<dyn Entity>>> {
        match record {
            Value::Object(map) => self.hydrate_map(&self.shape, map).map(Some),
            _ => Ok(None),
        }
    }

    fn hydrate_map(&self, shape: &HydrationShape, record: &Map<String, Value>) -> OrmResult<Arc<dyn Entity>> {
        let mut properties = PropertyMap::new();

        for (name, value) in record {
            let property = match (shape.child(name), value) {
                (_, Value::Null) => Property::Null,
                (Some(child), Value::Object(nested)) => {
                    Property::Entity(self.hydrate_map(child, nested)?)
                }
                (Some(child), Value::Array(items)) => {
                    let mut entities = Vec::with_capacity(items.len());
                    for item in items {
                        if let Value::Object(nested) = item {
                            entities.push(self.hydrate_map(child, nested)?);
                        }
                    }
                    Property::Entities(entities)
                }
                (_, other) => Property::Value(other.clone()),
            };
            properties.insert(name.clone(), property);
        }

        tracing::trace!(collection = %shape.collection, properties = properties.len(), "Hydrating record");

        match self.registry.entity_factory(&shape.collection) {
            Some(factory) => factory.build(&shape.collection, properties),
            None => DefaultEntityFactory.build(&shape.collection, properties),
        }
    }
}
