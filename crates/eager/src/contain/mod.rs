//! Containment - parsing, merging and normalizing eager-load requests

pub mod tree;

pub use tree::{parse_nodes, ContainNode, ContainOptions, ContainTree, FieldSelection, IntoContain};

use crate::config::EngineConfig;
use crate::error::{OrmError, OrmResult};
use crate::schema::Registry;

/// Check a containment tree against the association graph rooted at `root`
///
/// Fails on unknown association names, on trees deeper than the configured
/// maximum, and on branches that revisit a collection already joined on their
/// own ancestor path. A deferred branch starts a new statement, so its path
/// restarts at its target.
pub fn normalize(tree: &ContainTree, root: &str, registry: &Registry, config: &EngineConfig) -> OrmResult<()> {
    let depth = tree.depth();
    if depth > config.max_depth {
        return Err(OrmError::Configuration(format!(
            "Containment depth {} exceeds the maximum of {}",
            depth, config.max_depth
        )));
    }

    let mut path = vec![root.to_string()];
    for node in tree.nodes() {
        check_node(node, root, &mut path, registry)?;
    }

    tracing::debug!(root = %root, depth, contain = %tree.to_value(), "Normalized containment");
    Ok(())
}

fn check_node(node: &ContainNode, owner: &str, path: &mut Vec<String>, registry: &Registry) -> OrmResult<()> {
    let descriptor = registry
        .association(owner, &node.name)
        .ok_or_else(|| OrmError::unknown_association(owner, &node.name))?;

    let joined = node.is_matching() || !node.options.strategy.unwrap_or(descriptor.strategy).is_deferred();

    if !joined {
        let mut fresh = vec![descriptor.target.clone()];
        for child in &node.children {
            check_node(child, &descriptor.target, &mut fresh, registry)?;
        }
        return Ok(());
    }

    if path.iter().any(|collection| *collection == descriptor.target) {
        let mut cycle = path.clone();
        cycle.push(descriptor.target.clone());
        return Err(OrmError::CyclicContainment {
            path: cycle.join("."),
        });
    }

    path.push(descriptor.target.clone());
    for child in &node.children {
        check_node(child, &descriptor.target, path, registry)?;
    }
    path.pop();
    Ok(())
}
