//! Row Assembler - folds flat `alias__field` rows into nested records

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::loading::EagerLoadResult;
use crate::planner::{AssemblyPlan, DeferredBranch, JoinedBranch};
use crate::row::{canonical_key, split_column_alias, RawRow, Record, ALIAS_SEPARATOR};

/// Assemble every raw row of one statement
///
/// `loaded` is aligned with `deferred`. Returns each record with the index of
/// the raw row it came from; rows repeated by a matching join are dropped,
/// keeping the first occurrence.
pub fn assemble(
    plan: &AssemblyPlan,
    deferred: &[DeferredBranch],
    loaded: &[EagerLoadResult],
    rows: &[RawRow],
) -> Vec<(usize, Record)> {
    let mut aliases = HashSet::new();
    collect_aliases(&plan.branches, &mut aliases);

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        if !plan.dedupe_columns.is_empty() && !seen.insert(dedupe_key(row, &plan.dedupe_columns)) {
            tracing::trace!(row = index, "Skipping duplicate row from matching join");
            continue;
        }

        let record = assemble_row(plan, &aliases, deferred, loaded, row);
        tracing::trace!(row = index, properties = record.len(), "Assembled record");
        records.push((index, record));
    }

    records
}

fn collect_aliases<'a>(branches: &'a [JoinedBranch], aliases: &mut HashSet<&'a str>) {
    for branch in branches {
        aliases.insert(branch.alias.as_str());
        collect_aliases(&branch.children, aliases);
    }
}

fn dedupe_key(row: &RawRow, columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| {
            row.get(column)
                .and_then(canonical_key)
                .unwrap_or_else(|| "\u{0}".to_string())
        })
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn assemble_row(
    plan: &AssemblyPlan,
    aliases: &HashSet<&str>,
    deferred: &[DeferredBranch],
    loaded: &[EagerLoadResult],
    row: &RawRow,
) -> Record {
    let mut root = Record::new();
    let mut columns: HashMap<&str, Record> = HashMap::new();

    for (column, value) in row {
        if plan.hidden.contains(column) {
            continue;
        }
        match split_column_alias(column) {
            Some((alias, rest)) if alias == plan.root_alias => insert_path(&mut root, rest, value),
            Some((alias, rest)) if aliases.contains(alias) => {
                let target = columns.entry(alias).or_default();
                insert_path(target, rest, value);
            }
            Some(_) => insert_path(&mut root, column, value),
            None => {
                root.insert(column.clone(), value.clone());
            }
        }
    }

    for branch in &plan.branches {
        attach_branch(&mut root, branch, row, &mut columns, deferred, loaded);
    }
    attach_deferred(&mut root, &plan.root_deferred, row, deferred, loaded);
    root
}

/// Insert `value` at a `__`-separated path, creating nested maps on the way
fn insert_path(record: &mut Record, path: &str, value: &Value) {
    match path.split_once(ALIAS_SEPARATOR) {
        Some((head, rest)) => {
            let slot = record
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Record::new()));
            if !slot.is_object() {
                *slot = Value::Object(Record::new());
            }
            if let Value::Object(nested) = slot {
                insert_path(nested, rest, value);
            }
        }
        None => {
            record.insert(path.to_string(), value.clone());
        }
    }
}

fn attach_branch(
    record: &mut Record,
    branch: &JoinedBranch,
    row: &RawRow,
    columns: &mut HashMap<&str, Record>,
    deferred: &[DeferredBranch],
    loaded: &[EagerLoadResult],
) {
    let missing = !branch.null_columns.is_empty()
        && branch
            .null_columns
            .iter()
            .all(|column| row.get(column).map_or(true, Value::is_null));
    if missing {
        record.insert(branch.property.clone(), Value::Null);
        return;
    }

    let mut own = columns.remove(branch.alias.as_str()).unwrap_or_default();
    for child in &branch.children {
        attach_branch(&mut own, child, row, columns, deferred, loaded);
    }
    attach_deferred(&mut own, &branch.deferred, row, deferred, loaded);
    record.insert(branch.property.clone(), Value::Object(own));
}

fn attach_deferred(
    record: &mut Record,
    indexes: &[usize],
    row: &RawRow,
    deferred: &[DeferredBranch],
    loaded: &[EagerLoadResult],
) {
    for &index in indexes {
        let (Some(branch), Some(result)) = (deferred.get(index), loaded.get(index)) else {
            continue;
        };
        let Some(key) = row.get(&branch.owner_key_column).and_then(canonical_key) else {
            continue;
        };
        let Some(matches) = result.get(&key) else {
            continue;
        };
        let value = if branch.kind().is_collection() {
            Value::Array(matches.to_vec())
        } else {
            match matches.first() {
                Some(first) => first.clone(),
                None => continue,
            }
        };
        record.insert(branch.property().to_string(), value);
    }
}
