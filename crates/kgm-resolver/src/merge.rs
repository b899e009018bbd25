//! Pairwise merge of two chunk-graphs

use kgm_core::{KnowledgeGraph, Result};

use crate::matcher::FuzzyMatcher;
use crate::remap::{remap_relationships, DanglingPolicy};
use crate::resolver::{EntityResolver, ResolutionStats};

/// Merge two graphs whose entity ids are already globally unique.
///
/// Entities of both graphs are resolved in one pass, then every relationship
/// is remapped onto the canonical ids. Since the remap table covers every
/// entity of the pair, an endpoint missing from it is dangling and its
/// relationship is dropped.
pub async fn merge_two<M: FuzzyMatcher>(
    a: KnowledgeGraph,
    b: KnowledgeGraph,
    resolver: &EntityResolver<M>,
) -> Result<KnowledgeGraph> {
    merge_pair(a, b, resolver).await.map(|(graph, _)| graph)
}

pub(crate) async fn merge_pair<M: FuzzyMatcher>(
    a: KnowledgeGraph,
    b: KnowledgeGraph,
    resolver: &EntityResolver<M>,
) -> Result<(KnowledgeGraph, ResolutionStats)> {
    let mut entities = a.entities;
    entities.extend(b.entities);
    let mut relationships = a.relationships;
    relationships.extend(b.relationships);

    let combined = KnowledgeGraph::new(entities, relationships);
    combined.validate_unique_ids("pairwise merge")?;

    let resolution = resolver.resolve(&combined.entities).await;
    let relationships = remap_relationships(
        combined.relationships,
        &resolution.id_remap,
        DanglingPolicy::Drop,
    );

    Ok((
        KnowledgeGraph::new(resolution.entities, relationships),
        resolution.stats,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgm_core::{Entity, KgmError, Relationship, ResolverConfig};

    fn resolver() -> EntityResolver {
        EntityResolver::new(ResolverConfig {
            enable_arbitration: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_merge_shared_entity() {
        let a = KnowledgeGraph::new(
            vec![
                Entity::new("a1", "Bounded Buffer").with_definition("Fixed-size queue"),
                Entity::new("a2", "Producer"),
            ],
            vec![Relationship::new("a2", "a1", "PartOf")],
        );
        let b = KnowledgeGraph::new(
            vec![
                Entity::new("b1", "bounded buffer").with_definition("Fixed-size queue"),
                Entity::new("b2", "Consumer"),
            ],
            vec![Relationship::new("b2", "b1", "PartOf")],
        );

        let merged = tokio_test::block_on(merge_two(a, b, &resolver())).unwrap();

        assert_eq!(merged.entities.len(), 3);
        let buffer = &merged.entities[0];
        assert_eq!(buffer.id, "a1");
        assert_eq!(buffer.definition, "Fixed-size queue");
        assert_eq!(
            merged.relationships,
            vec![
                Relationship::new("a2", "a1", "PartOf"),
                Relationship::new("b2", "a1", "PartOf"),
            ]
        );
    }

    #[test]
    fn test_merge_collapses_duplicate_edges() {
        let a = KnowledgeGraph::new(
            vec![Entity::new("a1", "Semaphore"), Entity::new("a2", "Monitor")],
            vec![Relationship::new("a1", "a2", "Contrasts")],
        );
        let b = KnowledgeGraph::new(
            vec![Entity::new("b1", "semaphore"), Entity::new("b2", "monitor")],
            vec![Relationship::new("b1", "b2", "Contrasts")],
        );

        let merged = tokio_test::block_on(merge_two(a, b, &resolver())).unwrap();
        assert_eq!(merged.entities.len(), 2);
        assert_eq!(merged.relationships.len(), 1);
    }

    #[test]
    fn test_merge_drops_dangling_and_self_loops() {
        let a = KnowledgeGraph::new(
            vec![Entity::new("a1", "Spin Lock")],
            vec![Relationship::new("a1", "nowhere", "Causes")],
        );
        let b = KnowledgeGraph::new(
            vec![Entity::new("b1", "spin lock")],
            vec![Relationship::new("b1", "a1", "IsA")],
        );

        let merged = tokio_test::block_on(merge_two(a, b, &resolver())).unwrap();
        assert_eq!(merged.entities.len(), 1);
        assert!(merged.relationships.is_empty());
    }

    #[test]
    fn test_merge_rejects_id_collision() {
        let a = KnowledgeGraph::new(vec![Entity::new("e1", "Thread")], vec![]);
        let b = KnowledgeGraph::new(vec![Entity::new("e1", "Process")], vec![]);

        let result = tokio_test::block_on(merge_two(a, b, &resolver()));
        assert!(matches!(
            result,
            Err(KgmError::DuplicateEntityId { ref id, .. }) if id == "e1"
        ));
    }

    #[test]
    fn test_merge_empty_graphs() {
        let merged = tokio_test::block_on(merge_two(
            KnowledgeGraph::default(),
            KnowledgeGraph::default(),
            &resolver(),
        ))
        .unwrap();
        assert!(merged.is_empty());
    }
}
