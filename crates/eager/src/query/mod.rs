//! Query Module - fluent query surface, conditions and statement plans

pub mod builder;
pub mod conditions;
pub mod options;
pub mod plan;
pub mod sql_generation;
pub mod types;

pub use builder::{IntoConditions, IntoSortKeys, Query, QueryEngine};
pub use conditions::{Condition, ConditionSet};
pub use options::QueryOptions;
pub use plan::{JoinClause, SelectField, SelectPlan, TableRef};
pub use types::{JoinType, OrderDirection, QueryOperator, SortKey};
