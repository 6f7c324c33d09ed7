//! Naming conventions - inferring tables, keys and join tables from collection names
//!
//! Collections are named in camelCase or PascalCase (`orderType`, `ArticlesTag`),
//! tables are underscored plurals (`order_types`, `articles_tags`) and foreign keys
//! are underscored singulars with an `_id` suffix (`order_type_id`).

/// Convert `orderType` / `OrderType` to `order_type`
pub fn underscore(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
            result.push(c);
        }
    }
    result
}

/// Simple pluralization (English-centric)
pub fn pluralize(name: &str) -> String {
    if name.ends_with('y')
        && !name.ends_with("ay")
        && !name.ends_with("ey")
        && !name.ends_with("iy")
        && !name.ends_with("oy")
        && !name.ends_with("uy")
    {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s')
        || name.ends_with("sh")
        || name.ends_with("ch")
        || name.ends_with('x')
        || name.ends_with('z')
    {
        if is_plural(name) {
            name.to_string()
        } else {
            format!("{}es", name)
        }
    } else {
        format!("{}s", name)
    }
}

/// Simple singularization (English-centric)
pub fn singularize(name: &str) -> String {
    if name.ends_with("ies") {
        format!("{}y", &name[..name.len() - 3])
    } else if name.ends_with("ses")
        || name.ends_with("ches")
        || name.ends_with("shes")
        || name.ends_with("xes")
        || name.ends_with("zes")
    {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

fn is_plural(name: &str) -> bool {
    name.ends_with('s') && !name.ends_with("ss") && !name.ends_with("us")
}

/// Convert `order_type` to `OrderType`
pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Default table for a collection: `orderType` => `order_types`
pub fn table_name(collection: &str) -> String {
    let underscored = underscore(collection);
    match underscored.rsplit_once('_') {
        Some((head, last)) => format!("{}_{}", head, pluralize(last)),
        None => pluralize(&underscored),
    }
}

/// Foreign key pointing at a collection: `orderType` => `order_type_id`
pub fn foreign_key(collection: &str) -> String {
    let underscored = underscore(collection);
    let singular = match underscored.rsplit_once('_') {
        Some((head, last)) => format!("{}_{}", head, singularize(last)),
        None => singularize(&underscored),
    };
    format!("{}_id", singular)
}

/// Default property for a collection-valued association: `Tag` => `tags`
pub fn collection_property(name: &str) -> String {
    table_name(name)
}

/// Join table for a many-to-many pair: (`Article`, `Tag`) => `articles_tags`
pub fn join_table_name(source: &str, target: &str) -> String {
    let mut tables = vec![table_name(source), table_name(target)];
    tables.sort();
    tables.join("_")
}

/// Collection alias of a join table: `articles_tags` => `ArticlesTag`
pub fn join_alias(join_table: &str) -> String {
    match join_table.rsplit_once('_') {
        Some((head, last)) => format!("{}{}", to_pascal_case(head), to_pascal_case(&singularize(last))),
        None => to_pascal_case(&singularize(join_table)),
    }
}
