//! Statement plans handed to the execution layer

use super::conditions::ConditionSet;
use super::types::{JoinType, SortKey};
use crate::row::column_alias;

/// Table reference with its statement alias
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectField {
    /// Table alias the column belongs to; `None` for free expressions
    pub table: Option<String>,
    /// Column name, `*` for every column of `table`, or an expression when `table` is `None`
    pub column: String,
    /// Output name in the raw row
    pub alias: Option<String>,
}

impl SelectField {
    /// `table.column AS table__column`
    pub fn aliased(table: impl Into<String>, column: impl Into<String>) -> Self {
        let table = table.into();
        let column = column.into();
        let alias = column_alias(&table, &column);
        Self {
            table: Some(table),
            column,
            alias: Some(alias),
        }
    }

    /// `table.column AS alias`
    pub fn with_alias(
        table: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
            alias: Some(alias.into()),
        }
    }

    /// `table.*`
    pub fn wildcard(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: "*".to_string(),
            alias: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.column == "*"
    }

    /// Name the column carries in a raw row
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.column.clone(),
        }
    }

    /// `table.column` as written in the statement
    pub fn qualified_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.column),
            None => self.column.clone(),
        }
    }
}

/// A JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub conditions: ConditionSet,
}

impl JoinClause {
    pub fn new(join_type: JoinType, table: TableRef, conditions: ConditionSet) -> Self {
        Self {
            join_type,
            table,
            conditions,
        }
    }

    pub fn alias(&self) -> &str {
        &self.table.alias
    }
}

/// Fully built SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub from: TableRef,
    pub fields: Vec<SelectField>,
    pub joins: Vec<JoinClause>,
    pub conditions: ConditionSet,
    pub group_by: Vec<String>,
    pub having: ConditionSet,
    pub order_by: Vec<SortKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
}

impl SelectPlan {
    pub fn new(from: TableRef) -> Self {
        Self {
            from,
            fields: Vec::new(),
            joins: Vec::new(),
            conditions: ConditionSet::new(),
            group_by: Vec::new(),
            having: ConditionSet::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn field(mut self, field: SelectField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn join(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    /// Every alias visible in the statement, root first
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.alias.as_str()).chain(self.joins.iter().map(|j| j.alias()))
    }

    /// Copy of this statement projecting only `column`, usable as an `IN (SELECT ...)` source
    ///
    /// ORDER BY is kept only when LIMIT or OFFSET make it significant.
    pub fn key_subquery(&self, column: &str) -> SelectPlan {
        let (table, name) = match column.split_once('.') {
            Some((table, name)) => (Some(table.to_string()), name.to_string()),
            None => (Some(self.from.alias.clone()), column.to_string()),
        };

        let keep_order = self.limit.is_some() || self.offset.is_some();
        SelectPlan {
            from: self.from.clone(),
            fields: vec![SelectField {
                table,
                column: name,
                alias: None,
            }],
            joins: self.joins.clone(),
            conditions: self.conditions.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by: if keep_order {
                self.order_by.clone()
            } else {
                Vec::new()
            },
            limit: self.limit,
            offset: self.offset,
            distinct: true,
        }
    }
}
