//! Statement execution backends
//!
//! The engine consumes a [`StatementExecutor`]; an in-memory backend is always
//! available and a PostgreSQL backend is provided behind the `postgres` feature.

pub mod core;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use self::core::{SqlDialect, StatementExecutor};
pub use memory::MemoryExecutor;
#[cfg(feature = "postgres")]
pub use postgres::PgExecutor;
