//! Map/reduce pipeline applied to assembled records
//!
//! Each stage offers every `(key, value)` pair of its input to a mapper. Mappers
//! emit final values or intermediate values grouped by key; a reducer then sees
//! every group once. The output of one stage is the input of the next.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Key of a value flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Index(usize),
    Name(String),
}

impl From<usize> for MapKey {
    fn from(index: usize) -> Self {
        MapKey::Index(index)
    }
}

impl From<&str> for MapKey {
    fn from(name: &str) -> Self {
        MapKey::Name(name.to_string())
    }
}

impl From<String> for MapKey {
    fn from(name: String) -> Self {
        MapKey::Name(name)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Index(index) => write!(f, "{}", index),
            MapKey::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Collects what mappers and reducers emit
#[derive(Debug, Default)]
pub struct Emitter {
    results: Vec<(MapKey, Value)>,
    groups: Vec<(MapKey, Vec<Value>)>,
    positions: HashMap<MapKey, usize>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a final value keyed by its position
    pub fn emit(&mut self, value: Value) {
        let key = MapKey::Index(self.results.len());
        self.results.push((key, value));
    }

    /// Emit a final value under an explicit key
    pub fn emit_keyed(&mut self, key: impl Into<MapKey>, value: Value) {
        self.results.push((key.into(), value));
    }

    /// Append `value` to the intermediate group of `key`
    pub fn emit_intermediate(&mut self, key: impl Into<MapKey>, value: Value) {
        let key = key.into();
        match self.positions.get(&key) {
            Some(&position) => self.groups[position].1.push(value),
            None => {
                self.positions.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![value]));
            }
        }
    }

    pub fn results(&self) -> &[(MapKey, Value)] {
        &self.results
    }

    pub fn groups(&self) -> &[(MapKey, Vec<Value>)] {
        &self.groups
    }

    fn take_groups(&mut self) -> Vec<(MapKey, Vec<Value>)> {
        self.positions.clear();
        std::mem::take(&mut self.groups)
    }
}

/// First half of a stage
pub trait Mapper: Send + Sync {
    fn apply(&self, key: &MapKey, value: &Value, emitter: &mut Emitter);
}

impl<F> Mapper for F
where
    F: Fn(&MapKey, &Value, &mut Emitter) + Send + Sync,
{
    fn apply(&self, key: &MapKey, value: &Value, emitter: &mut Emitter) {
        self(key, value, emitter)
    }
}

/// Optional second half of a stage, called once per intermediate group
pub trait Reducer: Send + Sync {
    fn apply(&self, key: &MapKey, values: &[Value], emitter: &mut Emitter);
}

impl<F> Reducer for F
where
    F: Fn(&MapKey, &[Value], &mut Emitter) + Send + Sync,
{
    fn apply(&self, key: &MapKey, values: &[Value], emitter: &mut Emitter) {
        self(key, values, emitter)
    }
}

/// One mapper with its optional reducer
#[derive(Clone)]
pub struct Stage {
    pub mapper: Arc<dyn Mapper>,
    pub reducer: Option<Arc<dyn Reducer>>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("mapper", &"<mapper>")
            .field("reducer", &self.reducer.as_ref().map(|_| "<reducer>"))
            .finish()
    }
}

impl Stage {
    pub fn new(mapper: Arc<dyn Mapper>, reducer: Option<Arc<dyn Reducer>>) -> Self {
        Self { mapper, reducer }
    }

    /// Check whether this stage carries exactly `mapper` and `reducer`
    pub fn is(&self, mapper: &Arc<dyn Mapper>, reducer: Option<&Arc<dyn Reducer>>) -> bool {
        let same_reducer = match (&self.reducer, reducer) {
            (Some(own), Some(other)) => Arc::ptr_eq(own, other),
            (None, None) => true,
            _ => false,
        };
        Arc::ptr_eq(&self.mapper, mapper) && same_reducer
    }

    /// Run the stage over `input`
    ///
    /// Without a reducer, intermediate groups are passed on as arrays after the
    /// directly emitted values.
    pub fn run(&self, input: Vec<(MapKey, Value)>) -> Vec<(MapKey, Value)> {
        let mut emitter = Emitter::new();
        for (key, value) in &input {
            self.mapper.apply(key, value, &mut emitter);
        }

        let groups = emitter.take_groups();
        match &self.reducer {
            Some(reducer) => {
                for (key, values) in &groups {
                    reducer.apply(key, values, &mut emitter);
                }
                emitter.results
            }
            None => {
                let mut output = emitter.results;
                output.extend(groups.into_iter().map(|(key, values)| (key, Value::Array(values))));
                output
            }
        }
    }
}

/// Run `stages` in order over `records`, keyed by position
pub fn run_stages(stages: &[Stage], records: Vec<Value>) -> Vec<Value> {
    if stages.is_empty() {
        return records;
    }

    let mut current: Vec<(MapKey, Value)> = records
        .into_iter()
        .enumerate()
        .map(|(index, value)| (MapKey::Index(index), value))
        .collect();
    for (position, stage) in stages.iter().enumerate() {
        current = stage.run(current);
        tracing::trace!(stage = position, values = current.len(), "Ran map/reduce stage");
    }
    current.into_iter().map(|(_, value)| value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![json!({"a": 1}), json!({"a": 2})]
    }

    #[test]
    fn test_mapper_only_stage() {
        let mapper: Arc<dyn Mapper> = Arc::new(|_: &MapKey, value: &Value, emitter: &mut Emitter| {
            emitter.emit(value["a"].clone());
        });
        let stages = vec![Stage::new(mapper, None)];
        assert_eq!(run_stages(&stages, rows()), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_second_stage_reduces_intermediate_groups() {
        let first: Arc<dyn Mapper> = Arc::new(|_: &MapKey, value: &Value, emitter: &mut Emitter| {
            emitter.emit(value["a"].clone());
        });
        let second: Arc<dyn Mapper> = Arc::new(|key: &MapKey, value: &Value, emitter: &mut Emitter| {
            emitter.emit_intermediate(key.clone(), value.clone());
        });
        let reducer: Arc<dyn Reducer> = Arc::new(|_: &MapKey, values: &[Value], emitter: &mut Emitter| {
            let first = values[0].as_i64().unwrap_or_default();
            emitter.emit(json!(first + 1));
        });
        let stages = vec![Stage::new(first, None), Stage::new(second, Some(reducer))];
        assert_eq!(run_stages(&stages, rows()), vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_unreduced_groups_pass_through_as_arrays() {
        let mapper: Arc<dyn Mapper> = Arc::new(|_: &MapKey, value: &Value, emitter: &mut Emitter| {
            let bucket = if value["a"].as_i64() == Some(1) { "odd" } else { "even" };
            emitter.emit_intermediate(bucket, value["a"].clone());
            emitter.emit_intermediate("all", value["a"].clone());
        });
        let stages = vec![Stage::new(mapper, None)];
        assert_eq!(
            run_stages(&stages, rows()),
            vec![json!([1]), json!([1, 2]), json!([2])]
        );
    }

    #[test]
    fn test_emitter_keys() {
        let mut emitter = Emitter::new();
        emitter.emit(json!("x"));
        emitter.emit_keyed("named", json!("y"));
        emitter.emit(json!("z"));
        let keys: Vec<String> = emitter.results().iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["0", "named", "2"]);
        assert!(emitter.groups().is_empty());
    }
}
