//! # elif-eager: Association-aware queries for elif.rs
//!
//! Builds SELECT queries over a registry of collections and their
//! associations. A containment request ("contain") is planned into one root
//! statement with joins where possible and deferred statements where not; the
//! flat rows are folded back into nested records, passed through optional
//! map/reduce stages and hydrated into entities.

pub mod assembly;
pub mod backends;
pub mod config;
pub mod contain;
pub mod error;
pub mod hydration;
pub mod loading;
pub mod pipeline;
pub mod planner;
pub mod query;
pub mod relationships;
pub mod result;
pub mod row;
pub mod schema;

// Re-export core types
pub use backends::{MemoryExecutor, SqlDialect, StatementExecutor};
#[cfg(feature = "postgres")]
pub use backends::PgExecutor;
pub use config::{EngineConfig, EngineDefaults};
pub use contain::{ContainNode, ContainTree, FieldSelection, IntoContain};
pub use error::{OrmError, OrmResult};
pub use hydration::{
    DefaultEntityFactory, Entity, EntityFactory, GenericEntity, HydrationShape, Hydrator, Property, PropertyMap,
};
pub use pipeline::{Emitter, MapKey, Mapper, Reducer, Stage};
pub use planner::{JoinPlanner, StatementPlan};
pub use query::{
    Condition, ConditionSet, IntoConditions, IntoSortKeys, JoinClause, JoinType, OrderDirection, Query,
    QueryEngine, QueryOperator, QueryOptions, SelectPlan, SortKey,
};
pub use relationships::{AssociationDescriptor, AssociationKind, AssociationOptions, Strategy};
pub use result::{ResultItem, ResultIter, ResultSet};
pub use row::{RawRow, Record};
pub use schema::{Collection, FieldType, Registry};
