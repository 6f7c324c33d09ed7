//! Raw rows, assembled records and key canonicalization

use serde_json::{Map, Value};

/// Flat row returned by the statement layer, keyed by `alias__field`
pub type RawRow = Map<String, Value>;

/// Nested record produced by the row assembler
pub type Record = Map<String, Value>;

/// Separator between an alias and a field in projected column names
pub const ALIAS_SEPARATOR: &str = "__";

/// Build the projected column name for `alias.field`
pub fn column_alias(alias: &str, field: &str) -> String {
    format!("{}{}{}", alias, ALIAS_SEPARATOR, field)
}

/// Split `alias__field` into `(alias, field)` at the first separator
pub fn split_column_alias(column: &str) -> Option<(&str, &str)> {
    column.split_once(ALIAS_SEPARATOR)
}

/// Canonical form of a scalar used for key comparison
///
/// Numbers and their string renderings compare equal, so `1`, `1.0` and `"1"`
/// all produce the same key. Null yields `None` and never matches anything.
pub fn canonical_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(canonical_number(n)),
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(parsed) if !trimmed.is_empty() && parsed.is_finite() => {
                    Some(canonical_float(parsed))
                }
                _ => Some(s.clone()),
            }
        }
        other => Some(other.to_string()),
    }
}

/// Canonical key of a composite tuple; `None` when any component is null
pub fn canonical_tuple<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Value>,
{
    let parts = values
        .into_iter()
        .map(canonical_key)
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("\u{1f}"))
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map(canonical_float).unwrap_or_else(|| n.to_string())
}

fn canonical_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Loose equality used by the in-memory backend and key matching
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (canonical_key(left), canonical_key(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

/// Total order over scalars: null first, numbers numerically, then strings
pub fn compare_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => as_text(left).cmp(&as_text(right)),
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
