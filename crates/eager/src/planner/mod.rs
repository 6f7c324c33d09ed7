//! Join Planner
//!
//! Walks a containment tree alongside the association graph and turns it into
//! one [`SelectPlan`] plus a list of deferred branches. Joined nodes add JOIN
//! clauses and aliased columns to the statement; deferred nodes are left to the
//! eager loader, which plans them later with [`JoinPlanner::plan_deferred`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::contain::{ContainNode, ContainTree, FieldSelection};
use crate::error::{OrmError, OrmResult};
use crate::hydration::HydrationShape;
use crate::query::conditions::{Condition, ConditionSet};
use crate::query::plan::{JoinClause, SelectField, SelectPlan, TableRef};
use crate::query::types::{qualify_column, JoinType};
use crate::relationships::association::{AssociationDescriptor, AssociationKind, ForeignKeySide, Strategy};
use crate::row::column_alias;
use crate::schema::Registry;

/// Resolve the fetch strategy of one containment node
///
/// `matching` forces a join; otherwise the node override wins over the
/// descriptor default. Collection associations can only be joined as filters.
pub fn resolve_strategy(descriptor: &AssociationDescriptor, node: &ContainNode) -> OrmResult<Strategy> {
    if node.is_matching() {
        return match node.options.strategy {
            Some(strategy) if strategy.is_deferred() => Err(OrmError::invalid_strategy(
                &descriptor.name,
                strategy,
                "matching associations are always joined",
            )),
            _ => Ok(Strategy::Join),
        };
    }

    let strategy = node.options.strategy.unwrap_or(descriptor.strategy);
    if strategy == Strategy::Join && descriptor.kind.is_collection() {
        return Err(OrmError::invalid_strategy(
            &descriptor.name,
            strategy,
            "to-many associations can only be joined with matching",
        ));
    }
    Ok(strategy)
}

/// Statement the planner starts from
#[derive(Debug, Clone)]
pub struct StatementBase {
    /// Root collection name, also the root alias
    pub collection: String,
    /// Select entries as given by the caller (`field` or `alias.field`)
    pub select: Vec<String>,
    /// Everything else: explicit joins, conditions, order, grouping and window
    pub plan: SelectPlan,
}

/// Joined association inside one statement
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedBranch {
    pub alias: String,
    pub property: String,
    /// Raw columns that are all null when the join found nothing
    pub null_columns: Vec<String>,
    pub children: Vec<JoinedBranch>,
    /// Indexes into [`StatementPlan::deferred`] owned by this branch
    pub deferred: Vec<usize>,
}

/// How raw rows of one statement are folded into records
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssemblyPlan {
    pub root_alias: String,
    pub branches: Vec<JoinedBranch>,
    pub root_deferred: Vec<usize>,
    /// Columns selected only for assembly, never part of a record
    pub hidden: HashSet<String>,
    /// De-duplication key when a matching join can multiply root rows
    pub dedupe_columns: Vec<String>,
}

/// Association fetched by a separate statement after its owner
#[derive(Debug, Clone)]
pub struct DeferredBranch {
    pub descriptor: Arc<AssociationDescriptor>,
    pub node: ContainNode,
    pub strategy: Strategy,
    pub owner_alias: String,
    /// Raw column carrying the owner key
    pub owner_key_column: String,
    /// `alias.column` of the owner key inside the owner statement
    pub owner_key_source: String,
}

impl DeferredBranch {
    pub fn property(&self) -> &str {
        &self.descriptor.property
    }

    pub fn kind(&self) -> AssociationKind {
        self.descriptor.kind
    }
}

/// Planned statement with everything needed to load and assemble it
#[derive(Debug, Clone)]
pub struct StatementPlan {
    pub select: SelectPlan,
    pub assembly: AssemblyPlan,
    pub deferred: Vec<DeferredBranch>,
    pub shape: HydrationShape,
    /// Raw column the owner keys are matched on, set for deferred statements
    pub match_column: Option<String>,
    /// Column the owner key filter applies to, set for deferred statements
    pub match_source: Option<String>,
}

/// Mutable state of one statement under construction
struct Builder {
    select: SelectPlan,
    assembly: AssemblyPlan,
    deferred: Vec<DeferredBranch>,
    aliases: HashSet<String>,
    has_collection_join: bool,
}

impl Builder {
    fn new(select: SelectPlan, root_alias: &str) -> OrmResult<Self> {
        let mut builder = Self {
            assembly: AssemblyPlan {
                root_alias: root_alias.to_string(),
                ..AssemblyPlan::default()
            },
            select,
            deferred: Vec::new(),
            aliases: HashSet::new(),
            has_collection_join: false,
        };
        builder.claim_alias(root_alias)?;
        let explicit: Vec<String> = builder.select.joins.iter().map(|j| j.alias().to_string()).collect();
        for alias in explicit {
            builder.claim_alias(&alias)?;
        }
        Ok(builder)
    }

    fn claim_alias(&mut self, alias: &str) -> OrmResult<()> {
        if !self.aliases.insert(alias.to_string()) {
            return Err(OrmError::AmbiguousAlias {
                alias: alias.to_string(),
            });
        }
        Ok(())
    }

    fn has_output(&self, output: &str) -> bool {
        self.select.fields.iter().any(|field| field.output_name() == output)
    }

    /// Select `table.column AS output` for assembly unless it is already projected
    fn ensure_column(&mut self, table: &str, column: &str, output: &str) {
        if !self.has_output(output) {
            self.select
                .fields
                .push(SelectField::with_alias(table, column, output));
            self.assembly.hidden.insert(output.to_string());
        }
    }

    fn push_field(&mut self, field: SelectField) {
        let output = field.output_name();
        if !self.has_output(&output) {
            self.select.fields.push(field);
        }
    }
}

/// Plans statements for one registry
#[derive(Debug, Clone)]
pub struct JoinPlanner {
    registry: Registry,
}

impl JoinPlanner {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Plan the root statement of a query
    pub fn plan(&self, base: StatementBase, tree: &ContainTree) -> OrmResult<StatementPlan> {
        let root = self.registry.collection(&base.collection)?;
        let alias = base.collection.clone();

        let mut select = base.plan;
        select.from = TableRef::new(root.table.clone(), alias.clone());
        select.fields.clear();
        select.conditions = select.conditions.qualified(&alias);
        select.having = select.having.qualified(&alias);
        select.order_by = select.order_by.iter().map(|key| key.qualified(&alias)).collect();
        select.group_by = select
            .group_by
            .iter()
            .map(|column| qualify_column(column, &alias))
            .collect();

        let mut builder = Builder::new(select, &alias)?;

        if base.select.is_empty() {
            if root.has_declared_fields() {
                for field in &root.fields {
                    builder.push_field(SelectField::aliased(&alias, &field.name));
                }
            } else {
                builder.push_field(SelectField::wildcard(&alias));
            }
        } else {
            for entry in &base.select {
                builder.push_field(root_field(entry, &alias));
            }
        }

        let mut shape = HydrationShape::new(&base.collection);
        let mut deferred = Vec::new();
        self.plan_children(&mut builder, &base.collection, &alias, tree.nodes(), &mut shape, &mut deferred, None)?;
        builder.assembly.root_deferred = deferred;

        if builder.has_collection_join {
            let pk = column_alias(&alias, &root.primary_key);
            builder.ensure_column(&alias, &root.primary_key, &pk);
            builder.assembly.dedupe_columns = vec![pk];
        }

        tracing::debug!(
            root = %base.collection,
            joins = builder.select.joins.len(),
            fields = builder.select.fields.len(),
            deferred = builder.deferred.len(),
            "Planned statement"
        );

        Ok(StatementPlan {
            select: builder.select,
            assembly: builder.assembly,
            deferred: builder.deferred,
            shape,
            match_column: None,
            match_source: None,
        })
    }

    /// Plan the statement fetching a deferred branch, rooted at its target
    ///
    /// The owner key filter is not part of the returned plan; the loader adds
    /// it on `match_source` once the owner keys are known.
    pub fn plan_deferred(&self, branch: &DeferredBranch) -> OrmResult<StatementPlan> {
        let descriptor = &branch.descriptor;
        let node = &branch.node;
        let target = self.registry.collection(&descriptor.target)?;
        let alias = descriptor.name.clone();

        let mut select = SelectPlan::new(TableRef::new(target.table.clone(), alias.clone()));
        select.conditions.merge(&descriptor.conditions.qualified(&alias));
        if let Some(conditions) = &node.options.conditions {
            select.conditions.merge(&conditions.qualified(&alias));
        }
        let sort = node.options.sort.as_ref().unwrap_or(&descriptor.sort);
        select.order_by = sort.iter().map(|key| key.qualified(&alias)).collect();

        let mut builder = Builder::new(select, &alias)?;

        match node.field_selection() {
            FieldSelection::All if target.has_declared_fields() => {
                for field in &target.fields {
                    builder.push_field(SelectField::aliased(&alias, &field.name));
                }
            }
            FieldSelection::All => builder.push_field(SelectField::wildcard(&alias)),
            FieldSelection::Explicit(fields) => {
                for entry in fields {
                    builder.push_field(node_field(entry, &alias));
                }
            }
            FieldSelection::None => {}
        }

        let (match_column, match_source) = match &descriptor.join_table {
            Some(join_table) => {
                builder.claim_alias(&join_table.collection)?;
                let on = ConditionSet::new().and(Condition::columns(
                    format!("{}.{}", join_table.collection, join_table.target_foreign_key),
                    format!("{}.{}", alias, descriptor.target_key),
                ));
                builder.select.joins.push(JoinClause::new(
                    JoinType::Inner,
                    TableRef::new(join_table.table.clone(), join_table.collection.clone()),
                    on,
                ));
                for column in self.pivot_columns(descriptor)? {
                    let output = pivot_alias(&alias, &join_table.collection, &column);
                    builder.push_field(SelectField::with_alias(&join_table.collection, &column, output));
                }
                (
                    pivot_alias(&alias, &join_table.collection, descriptor.match_key()),
                    format!("{}.{}", join_table.collection, descriptor.match_key()),
                )
            }
            None => {
                let output = column_alias(&alias, descriptor.match_key());
                builder.ensure_column(&alias, descriptor.match_key(), &output);
                (output, format!("{}.{}", alias, descriptor.match_key()))
            }
        };

        let mut shape = HydrationShape::new(&descriptor.target);
        if let Some(join_table) = &descriptor.join_table {
            shape = shape.with_child(&join_table.collection, HydrationShape::new(&join_table.collection));
        }
        let mut deferred = Vec::new();
        self.plan_children(&mut builder, &descriptor.target, &alias, &node.children, &mut shape, &mut deferred, None)?;
        builder.assembly.root_deferred = deferred;

        if builder.has_collection_join {
            let pk = column_alias(&alias, &target.primary_key);
            builder.ensure_column(&alias, &target.primary_key, &pk);
            builder.assembly.dedupe_columns = vec![pk, match_column.clone()];
        }

        tracing::debug!(
            association = %descriptor.name,
            strategy = %branch.strategy,
            joins = builder.select.joins.len(),
            deferred = builder.deferred.len(),
            "Planned deferred statement"
        );

        Ok(StatementPlan {
            select: builder.select,
            assembly: builder.assembly,
            deferred: builder.deferred,
            shape,
            match_column: Some(match_column),
            match_source: Some(match_source),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_children(
        &self,
        builder: &mut Builder,
        owner: &str,
        owner_alias: &str,
        nodes: &[ContainNode],
        shape: &mut HydrationShape,
        deferred: &mut Vec<usize>,
        mut branches: Option<&mut Vec<JoinedBranch>>,
    ) -> OrmResult<()> {
        for node in nodes {
            let registered = self
                .registry
                .association(owner, &node.name)
                .ok_or_else(|| OrmError::unknown_association(owner, &node.name))?;
            let descriptor = match &node.options.foreign_key {
                Some(column) => Arc::new((*registered).clone().with_foreign_key(column.clone())),
                None => registered,
            };
            self.registry.check_keys(&descriptor)?;

            let strategy = resolve_strategy(&descriptor, node)?;
            let mut child_shape = HydrationShape::new(&descriptor.target);
            if let Some(join_table) = &descriptor.join_table {
                child_shape = child_shape.with_child(&join_table.collection, HydrationShape::new(&join_table.collection));
            }

            if strategy.is_deferred() {
                let owner_key_column = column_alias(owner_alias, descriptor.owner_key());
                builder.ensure_column(owner_alias, descriptor.owner_key(), &owner_key_column);
                let planned = DeferredBranch {
                    owner_key_source: format!("{}.{}", owner_alias, descriptor.owner_key()),
                    owner_key_column,
                    owner_alias: owner_alias.to_string(),
                    strategy,
                    node: node.clone(),
                    descriptor: descriptor.clone(),
                };
                deferred.push(builder.deferred.len());
                builder.deferred.push(planned);
                add_deferred_shape(&self.registry, &mut child_shape, &descriptor.target, &node.children);
                shape.children.push((descriptor.property.clone(), child_shape));
                continue;
            }

            let branch = self.plan_join(builder, owner_alias, &descriptor, node, &mut child_shape)?;
            shape.children.push((descriptor.property.clone(), child_shape));
            match branches.as_deref_mut() {
                Some(siblings) => siblings.push(branch),
                None => builder.assembly.branches.push(branch),
            }
        }
        Ok(())
    }

    fn plan_join(
        &self,
        builder: &mut Builder,
        owner_alias: &str,
        descriptor: &Arc<AssociationDescriptor>,
        node: &ContainNode,
        shape: &mut HydrationShape,
    ) -> OrmResult<JoinedBranch> {
        let alias = descriptor.name.clone();
        let target = self.registry.collection(&descriptor.target)?;
        let join_type = if node.is_matching() || descriptor.required {
            JoinType::Inner
        } else {
            JoinType::Left
        };

        let mut extra = descriptor.conditions.qualified(&alias);
        if let Some(conditions) = &node.options.conditions {
            extra.merge(&conditions.qualified(&alias));
        }

        match &descriptor.join_table {
            Some(join_table) => {
                builder.claim_alias(&join_table.collection)?;
                builder.claim_alias(&alias)?;
                let pivot_on = ConditionSet::new().and(Condition::columns(
                    format!("{}.{}", join_table.collection, join_table.source_foreign_key),
                    format!("{}.{}", owner_alias, descriptor.source_key),
                ));
                builder.select.joins.push(JoinClause::new(
                    join_type,
                    TableRef::new(join_table.table.clone(), join_table.collection.clone()),
                    pivot_on,
                ));

                let mut on = ConditionSet::new().and(Condition::columns(
                    format!("{}.{}", alias, descriptor.target_key),
                    format!("{}.{}", join_table.collection, join_table.target_foreign_key),
                ));
                on.merge(&extra);
                builder.select.joins.push(JoinClause::new(
                    join_type,
                    TableRef::new(target.table.clone(), alias.clone()),
                    on,
                ));
            }
            None => {
                builder.claim_alias(&alias)?;
                let target_column = format!("{}.{}", alias, descriptor.target_key);
                let source_column = format!("{}.{}", owner_alias, descriptor.source_key);
                let key = match descriptor.foreign_key_side {
                    ForeignKeySide::Source => Condition::columns(target_column, source_column),
                    ForeignKeySide::Target => Condition::columns(source_column, target_column),
                };
                let mut on = ConditionSet::new().and(key);
                on.merge(&extra);
                builder.select.joins.push(JoinClause::new(
                    join_type,
                    TableRef::new(target.table.clone(), alias.clone()),
                    on,
                ));
            }
        }

        if descriptor.kind.is_collection() {
            builder.has_collection_join = true;
        }

        match node.field_selection() {
            FieldSelection::All => {
                if !target.has_declared_fields() {
                    return Err(OrmError::Configuration(format!(
                        "Collection '{}' declares no fields; list the fields to select for '{}'",
                        target.name, alias
                    )));
                }
                for field in &target.fields {
                    builder.push_field(SelectField::aliased(&alias, &field.name));
                }
            }
            FieldSelection::Explicit(fields) => {
                for entry in fields {
                    builder.push_field(node_field(entry, &alias));
                }
            }
            FieldSelection::None => {}
        }

        if let Some(join_table) = &descriptor.join_table {
            for column in self.pivot_columns(descriptor)? {
                let output = pivot_alias(&alias, &join_table.collection, &column);
                builder.push_field(SelectField::with_alias(&join_table.collection, &column, output));
            }
        }

        let null_column = column_alias(&alias, &descriptor.target_key);
        builder.ensure_column(&alias, &descriptor.target_key, &null_column);

        if let Some(sort) = &node.options.sort {
            builder
                .select
                .order_by
                .extend(sort.iter().map(|key| key.qualified(&alias)));
        }

        let mut branch = JoinedBranch {
            alias: alias.clone(),
            property: descriptor.property.clone(),
            null_columns: vec![null_column],
            children: Vec::new(),
            deferred: Vec::new(),
        };

        let mut children = Vec::new();
        let mut deferred = Vec::new();
        self.plan_children(
            builder,
            &descriptor.target,
            &alias,
            &node.children,
            shape,
            &mut deferred,
            Some(&mut children),
        )?;
        branch.children = children;
        branch.deferred = deferred;
        Ok(branch)
    }

    /// Join table columns exposed under the pivot sub-key
    fn pivot_columns(&self, descriptor: &AssociationDescriptor) -> OrmResult<Vec<String>> {
        let join_table = descriptor.join_table.as_ref().ok_or_else(|| {
            OrmError::Configuration(format!("Association '{}' has no join table", descriptor.name))
        })?;
        let declared = self
            .registry
            .collection(&join_table.collection)
            .map(|collection| collection.field_names())
            .unwrap_or_default();
        if declared.is_empty() {
            Ok(vec![
                join_table.source_foreign_key.clone(),
                join_table.target_foreign_key.clone(),
            ])
        } else {
            Ok(declared)
        }
    }
}

/// Shape of the subtree a deferred statement will attach
fn add_deferred_shape(registry: &Registry, shape: &mut HydrationShape, owner: &str, nodes: &[ContainNode]) {
    for node in nodes {
        let Some(descriptor) = registry.association(owner, &node.name) else {
            continue;
        };
        let mut child = HydrationShape::new(&descriptor.target);
        if let Some(join_table) = &descriptor.join_table {
            child = child.with_child(&join_table.collection, HydrationShape::new(&join_table.collection));
        }
        add_deferred_shape(registry, &mut child, &descriptor.target, &node.children);
        shape.children.push((descriptor.property.clone(), child));
    }
}

/// `alias__JoinAlias__column`
fn pivot_alias(alias: &str, join_alias: &str, column: &str) -> String {
    column_alias(&column_alias(alias, join_alias), column)
}

/// Root select entry: `field` and `alias.field` both become `alias__field`
fn root_field(entry: &str, root_alias: &str) -> SelectField {
    match entry.split_once('.') {
        Some((table, column)) => SelectField::aliased(table, column),
        None => SelectField::aliased(root_alias, entry),
    }
}

/// Contained field entry: a dotted field keeps its table but is prefixed on output
fn node_field(entry: &str, alias: &str) -> SelectField {
    match entry.split_once('.') {
        Some((table, column)) => SelectField::with_alias(table, column, column_alias(alias, column)),
        None => SelectField::aliased(alias, entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contain::parse_nodes;
    use crate::relationships::association::AssociationOptions;
    use crate::schema::{Collection, FieldType};
    use serde_json::json;

    fn registry() -> Registry {
        let registry = Registry::new();
        let id = ("id", FieldType::Integer);
        let key = |name: &'static str| (name, FieldType::Integer);
        registry
            .register(Collection::new("foo").fields([id, key("client_id")]))
            .unwrap();
        registry
            .register(Collection::new("client").fields([
                id,
                ("name", FieldType::String),
                ("phone", FieldType::String),
                key("company_id"),
                key("organization_id"),
            ]))
            .unwrap();
        registry
            .register(Collection::new("order").fields([
                id,
                ("total", FieldType::String),
                ("placed", FieldType::Datetime),
                key("client_id"),
                key("order_type_id"),
            ]))
            .unwrap();
        registry
            .register(
                Collection::new("company")
                    .table("organizations")
                    .fields([id, key("category_id")]),
            )
            .unwrap();
        registry.register(Collection::new("orderType").fields([id])).unwrap();
        registry
            .register(
                Collection::new("stuff")
                    .table("things")
                    .fields([id, key("order_id"), key("stuff_type_id")]),
            )
            .unwrap();
        registry.register(Collection::new("stuffType").fields([id])).unwrap();
        registry.register(Collection::new("category").fields([id])).unwrap();

        let none = AssociationOptions::new;
        registry.belongs_to("foo", "client", none()).unwrap();
        registry.has_one("client", "order", none()).unwrap();
        registry.belongs_to("client", "company", none()).unwrap();
        registry.belongs_to("order", "orderType", none()).unwrap();
        registry.has_one("order", "stuff", none()).unwrap();
        registry.belongs_to("stuff", "stuffType", none()).unwrap();
        registry.belongs_to("company", "category", none()).unwrap();
        registry
    }

    fn base(select: &[&str]) -> StatementBase {
        StatementBase {
            collection: "foo".to_string(),
            select: select.iter().map(|s| s.to_string()).collect(),
            plan: SelectPlan::new(TableRef::new("foos", "foo")),
        }
    }

    fn tree(value: serde_json::Value) -> ContainTree {
        ContainTree::from_nodes(parse_nodes(&value).unwrap())
    }

    fn on(join: &JoinClause) -> String {
        match join.conditions.iter().next() {
            Some(Condition::Columns { left, right, .. }) => format!("{} = {}", left, right),
            other => panic!("unexpected join condition: {:?}", other),
        }
    }

    #[test]
    fn test_contain_to_joins_one_level() {
        let planner = JoinPlanner::new(registry());
        let contain = tree(json!({
            "client": {
                "order": ["orderType", {"stuff": ["stuffType"]}],
                "company": {"foreignKey": "organization_id", "category": null}
            }
        }));
        let plan = planner.plan(base(&["foo.id"]), &contain).unwrap();

        let joins: Vec<(String, String, JoinType, String)> = plan
            .select
            .joins
            .iter()
            .map(|j| (j.alias().to_string(), j.table.table.clone(), j.join_type, on(j)))
            .collect();
        let expected = vec![
            ("client", "clients", JoinType::Left, "client.id = foo.client_id"),
            ("order", "orders", JoinType::Inner, "client.id = order.client_id"),
            ("orderType", "order_types", JoinType::Left, "orderType.id = order.order_type_id"),
            ("stuff", "things", JoinType::Inner, "order.id = stuff.order_id"),
            ("stuffType", "stuff_types", JoinType::Left, "stuffType.id = stuff.stuff_type_id"),
            ("company", "organizations", JoinType::Left, "company.id = client.organization_id"),
            ("category", "categories", JoinType::Left, "category.id = company.category_id"),
        ];
        let expected: Vec<(String, String, JoinType, String)> = expected
            .into_iter()
            .map(|(a, t, j, o)| (a.to_string(), t.to_string(), j, o.to_string()))
            .collect();
        assert_eq!(joins, expected);
        assert!(plan.deferred.is_empty());
        assert_eq!(plan.assembly.branches.len(), 1);
        assert_eq!(plan.assembly.branches[0].children.len(), 2);
    }

    #[test]
    fn test_contain_fields_predefined() {
        let planner = JoinPlanner::new(registry());
        let contain = tree(json!({
            "client": {
                "fields": ["name", "company_id", "client.telephone"],
                "order": {"fields": ["total", "placed"]}
            }
        }));
        let plan = planner.plan(base(&["foo.id"]), &contain).unwrap();
        let visible: Vec<(String, String)> = plan
            .select
            .fields
            .iter()
            .filter(|f| !plan.assembly.hidden.contains(&f.output_name()))
            .map(|f| (f.output_name(), f.qualified_name()))
            .collect();
        assert_eq!(
            visible,
            vec![
                ("foo__id".to_string(), "foo.id".to_string()),
                ("client__name".to_string(), "client.name".to_string()),
                ("client__company_id".to_string(), "client.company_id".to_string()),
                ("client__telephone".to_string(), "client.telephone".to_string()),
                ("order__total".to_string(), "order.total".to_string()),
                ("order__placed".to_string(), "order.placed".to_string()),
            ]
        );
        assert!(plan.assembly.hidden.contains("client__id"));
        assert!(plan.assembly.hidden.contains("order__client_id"));
    }

    #[test]
    fn test_contain_fields_default_and_none() {
        let planner = JoinPlanner::new(registry());
        let plan = planner.plan(base(&[]), &tree(json!({"client": ["order"]}))).unwrap();
        let outputs: Vec<String> = plan.select.fields.iter().map(SelectField::output_name).collect();
        assert_eq!(
            outputs,
            vec![
                "foo__id",
                "foo__client_id",
                "client__id",
                "client__name",
                "client__phone",
                "client__company_id",
                "client__organization_id",
                "order__id",
                "order__total",
                "order__placed",
                "order__client_id",
                "order__order_type_id",
            ]
        );
        assert!(plan.assembly.hidden.is_empty());

        let plan = planner
            .plan(base(&[]), &tree(json!({"client": {"order": {"fields": false}}})))
            .unwrap();
        let visible: Vec<String> = plan
            .select
            .fields
            .iter()
            .map(SelectField::output_name)
            .filter(|name| !plan.assembly.hidden.contains(name))
            .collect();
        assert_eq!(
            visible,
            vec![
                "foo__id",
                "foo__client_id",
                "client__id",
                "client__name",
                "client__phone",
                "client__company_id",
                "client__organization_id",
            ]
        );
        assert!(plan.assembly.hidden.contains("order__client_id"));
    }

    #[test]
    fn test_strategy_resolution() {
        let registry = Registry::new();
        registry.register(Collection::new("author")).unwrap();
        registry.register(Collection::new("article")).unwrap();
        registry
            .has_many("author", "article", AssociationOptions::new())
            .unwrap();
        let descriptor = registry.association("author", "article").unwrap();

        let plain = ContainNode::new("article");
        assert_eq!(resolve_strategy(&descriptor, &plain).unwrap(), Strategy::Select);
        let matching = ContainNode::new("article").matching(true);
        assert_eq!(resolve_strategy(&descriptor, &matching).unwrap(), Strategy::Join);
        let forced = ContainNode::new("article").strategy(Strategy::Join);
        assert!(matches!(
            resolve_strategy(&descriptor, &forced),
            Err(OrmError::InvalidStrategy { .. })
        ));
        let conflicting = ContainNode::new("article").matching(true).strategy(Strategy::Subquery);
        assert!(matches!(
            resolve_strategy(&descriptor, &conflicting),
            Err(OrmError::InvalidStrategy { .. })
        ));
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let registry = registry();
        let planner = JoinPlanner::new(registry);
        let mut start = base(&[]);
        start.plan.joins.push(JoinClause::new(
            JoinType::Inner,
            TableRef::new("clients", "client"),
            ConditionSet::new(),
        ));
        let result = planner.plan(start, &tree(json!(["client"])));
        assert!(matches!(result, Err(OrmError::AmbiguousAlias { alias }) if alias == "client"));
    }

    #[test]
    fn test_deferred_branch_owner_keys_are_hidden() {
        let registry = Registry::new();
        registry
            .register(Collection::new("author").fields([("id", FieldType::Integer), ("name", FieldType::String)]))
            .unwrap();
        registry
            .register(Collection::new("article").fields([
                ("id", FieldType::Integer),
                ("title", FieldType::String),
                ("author_id", FieldType::Integer),
            ]))
            .unwrap();
        registry
            .has_many("author", "article", AssociationOptions::new())
            .unwrap();
        let planner = JoinPlanner::new(registry);

        let start = StatementBase {
            collection: "author".to_string(),
            select: vec!["name".to_string()],
            plan: SelectPlan::new(TableRef::new("authors", "author")),
        };
        let contain = tree(json!({"article": {"fields": ["title"], "sort": {"id": "DESC"}}}));
        let plan = planner.plan(start, &contain).unwrap();
        assert_eq!(plan.deferred.len(), 1);
        assert_eq!(plan.assembly.root_deferred, vec![0]);
        assert!(plan.assembly.hidden.contains("author__id"));
        assert_eq!(plan.deferred[0].owner_key_source, "author.id");

        let sub = planner.plan_deferred(&plan.deferred[0]).unwrap();
        assert_eq!(sub.select.from, TableRef::new("articles", "article"));
        assert_eq!(sub.match_column.as_deref(), Some("article__author_id"));
        assert_eq!(sub.match_source.as_deref(), Some("article.author_id"));
        assert!(sub.assembly.hidden.contains("article__author_id"));
        assert_eq!(sub.select.order_by[0].column, "article.id");
        assert_eq!(sub.shape.collection, "article");
    }
}
