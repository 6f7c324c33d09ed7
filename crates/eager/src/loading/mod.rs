//! Loading Module - statement execution and eager loading of deferred branches

pub mod eager_loader;

pub use eager_loader::{EagerLoadResult, EagerLoader};

use crate::backends::StatementExecutor;
use crate::error::{OrmError, OrmResult};
use crate::query::plan::SelectPlan;
use crate::row::RawRow;

/// Execute one statement, logging what is sent
pub(crate) async fn run_statement(executor: &dyn StatementExecutor, plan: &SelectPlan) -> OrmResult<Vec<RawRow>> {
    let (sql, params) = plan.to_sql(executor.dialect());
    tracing::debug!(sql = %sql, params = params.len(), "Executing statement");

    let rows = executor.run(plan).await.map_err(OrmError::Statement)?;
    tracing::debug!(rows = rows.len(), "Statement returned");
    Ok(rows)
}
