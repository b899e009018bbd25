//! Relationship remapping through an id-remap table

use std::collections::{HashMap, HashSet};

use kgm_core::Relationship;

/// What to do with an endpoint that is missing from the remap table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DanglingPolicy {
    /// Keep the endpoint as is
    #[default]
    PassThrough,
    /// Drop the relationship
    Drop,
}

/// Rewrite endpoints through `id_remap`, passing unknown ids through
pub fn remap(
    relationships: Vec<Relationship>,
    id_remap: &HashMap<String, String>,
) -> Vec<Relationship> {
    remap_relationships(relationships, id_remap, DanglingPolicy::PassThrough)
}

/// Rewrite endpoints through `id_remap`.
///
/// Relationships with an empty endpoint, or whose endpoints collapse onto the
/// same entity, are dropped. Duplicate `(source, target, type)` triples keep
/// their first occurrence. Order is otherwise preserved.
pub fn remap_relationships(
    relationships: Vec<Relationship>,
    id_remap: &HashMap<String, String>,
    policy: DanglingPolicy,
) -> Vec<Relationship> {
    let mut seen: HashSet<(String, String, String)> = HashSet::with_capacity(relationships.len());
    let mut result = Vec::with_capacity(relationships.len());

    for mut rel in relationships {
        let (Some(source), Some(target)) = (
            lookup(id_remap, &rel.source, policy),
            lookup(id_remap, &rel.target, policy),
        ) else {
            continue;
        };
        if source.is_empty() || target.is_empty() || source == target {
            continue;
        }

        let key = (source.clone(), target.clone(), rel.relation_type.clone());
        if !seen.insert(key) {
            continue;
        }

        rel.source = source;
        rel.target = target;
        result.push(rel);
    }

    result
}

fn lookup(id_remap: &HashMap<String, String>, id: &str, policy: DanglingPolicy) -> Option<String> {
    match (id_remap.get(id), policy) {
        (Some(canonical), _) => Some(canonical.clone()),
        (None, DanglingPolicy::PassThrough) => Some(id.to_string()),
        (None, DanglingPolicy::Drop) => None,
    }
}
