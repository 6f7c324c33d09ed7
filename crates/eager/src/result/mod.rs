//! Result sequence
//!
//! A [`ResultSet`] holds the assembled records of one execution. The pipeline
//! and hydration run lazily on first access and are cached, so clones of a set
//! share one evaluation. Unbuffered sets are forward-only: every iterator
//! continues where the previous one stopped. Buffered sets can be iterated any
//! number of times.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::OrmResult;
use crate::hydration::{Entity, Hydrator};
use crate::pipeline::{run_stages, Stage};

/// One element of a result set
#[derive(Debug, Clone)]
pub enum ResultItem {
    Value(Value),
    Entity(Arc<dyn Entity>),
}

impl ResultItem {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResultItem::Value(value) => Some(value),
            ResultItem::Entity(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Arc<dyn Entity>> {
        match self {
            ResultItem::Entity(entity) => Some(entity),
            ResultItem::Value(_) => None,
        }
    }

    pub fn downcast_ref<T: Entity + 'static>(&self) -> Option<&T> {
        self.as_entity().and_then(|entity| entity.downcast_ref::<T>())
    }

    /// Plain JSON form, whether hydrated or not
    pub fn to_value(&self) -> Value {
        match self {
            ResultItem::Value(value) => value.clone(),
            ResultItem::Entity(entity) => entity.to_value(),
        }
    }
}

struct Inner {
    records: Vec<Value>,
    stages: Vec<Stage>,
    hydrator: Option<Hydrator>,
    buffered: bool,
    processed: OnceCell<Vec<Value>>,
    hydrated: OnceCell<Vec<ResultItem>>,
    cursor: AtomicUsize,
}

/// Memoized output of one query execution
#[derive(Clone)]
pub struct ResultSet {
    inner: Arc<Inner>,
    hydrate: bool,
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("records", &self.inner.records.len())
            .field("stages", &self.inner.stages.len())
            .field("buffered", &self.inner.buffered)
            .field("hydrate", &self.hydrate)
            .finish()
    }
}

impl ResultSet {
    pub(crate) fn new(records: Vec<Value>, stages: Vec<Stage>, hydrator: Option<Hydrator>, buffered: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                records,
                stages,
                hydrator,
                buffered,
                processed: OnceCell::new(),
                hydrated: OnceCell::new(),
                cursor: AtomicUsize::new(0),
            }),
            hydrate: true,
        }
    }

    /// Pre-built, unhydrated set, e.g. for [`Query::set_result`](crate::query::Query::set_result)
    pub fn from_records(records: Vec<Value>) -> Self {
        Self::new(records, Vec::new(), None, false).with_hydration(false)
    }

    /// Same set, yielding entities or plain values
    pub fn with_hydration(mut self, hydrate: bool) -> Self {
        self.hydrate = hydrate;
        self
    }

    pub fn is_buffered(&self) -> bool {
        self.inner.buffered
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrate && self.inner.hydrator.is_some()
    }

    /// Check whether both handles share one execution
    pub fn ptr_eq(&self, other: &ResultSet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Records after the map/reduce pipeline
    pub fn values(&self) -> &[Value] {
        self.inner
            .processed
            .get_or_init(|| run_stages(&self.inner.stages, self.inner.records.clone()))
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    fn items(&self) -> OrmResult<Option<&[ResultItem]>> {
        let Some(hydrator) = self.inner.hydrator.as_ref().filter(|_| self.hydrate) else {
            return Ok(None);
        };
        let items = self.inner.hydrated.get_or_try_init(|| {
            self.values()
                .iter()
                .map(|value| {
                    Ok(match hydrator.hydrate(value)? {
                        Some(entity) => ResultItem::Entity(entity),
                        None => ResultItem::Value(value.clone()),
                    })
                })
                .collect::<OrmResult<Vec<_>>>()
        })?;
        Ok(Some(items.as_slice()))
    }

    /// Element at `position`
    pub fn get(&self, position: usize) -> OrmResult<Option<ResultItem>> {
        Ok(match self.items()? {
            Some(items) => items.get(position).cloned(),
            None => self.values().get(position).cloned().map(ResultItem::Value),
        })
    }

    /// First element, regardless of how far the set was iterated
    pub fn first(&self) -> OrmResult<Option<ResultItem>> {
        self.get(0)
    }

    /// Every element
    pub fn to_vec(&self) -> OrmResult<Vec<ResultItem>> {
        Ok(match self.items()? {
            Some(items) => items.to_vec(),
            None => self.values().iter().cloned().map(ResultItem::Value).collect(),
        })
    }

    /// Every element in plain JSON form
    pub fn to_values(&self) -> OrmResult<Vec<Value>> {
        Ok(self.to_vec()?.iter().map(ResultItem::to_value).collect())
    }

    /// Iterate the set; unbuffered sets continue from the shared cursor
    pub fn iter(&self) -> OrmResult<ResultIter> {
        let items = self.to_vec()?;
        let start = if self.inner.buffered {
            0
        } else {
            self.inner.cursor.load(Ordering::SeqCst)
        };
        Ok(ResultIter {
            set: self.clone(),
            items,
            position: start,
        })
    }
}

/// Iterator over a [`ResultSet`]
pub struct ResultIter {
    set: ResultSet,
    items: Vec<ResultItem>,
    position: usize,
}

impl Iterator for ResultIter {
    type Item = ResultItem;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.set.inner.buffered {
            self.position = self.set.inner.cursor.fetch_add(1, Ordering::SeqCst);
        }
        let item = self.items.get(self.position).cloned();
        if self.set.inner.buffered {
            self.position += 1;
        } else if item.is_none() {
            self.set.inner.cursor.store(self.items.len(), Ordering::SeqCst);
        }
        item
    }
}
