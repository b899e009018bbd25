//! Three-layer cascading entity resolver
//!
//! 1. Exact normalized label match, O(n) via a hash map
//! 2. Fuzzy match between the roots left by layer 1 (entropy-gated shingle
//!    Jaccard by default)
//! 3. One batched arbitration call for the singletons that remain
//!
//! Layers 1 and 2 are pure. Layer 3 may fail; a failure leaves the affected
//! entities unresolved and never aborts the pass.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use kgm_core::{validate_entity_ids, Entity, ResolverConfig, Result};

use crate::arbitration::{ArbitrationRequest, Arbitrator};
use crate::matcher::{FuzzyMatcher, ShingleMatcher};
use crate::normalize::normalize_exact;
use crate::union_find::UnionFind;

// ============================================================================
// Resolution output
// ============================================================================

/// Counters for one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub input_entities: usize,
    pub exact_merges: usize,
    pub fuzzy_merges: usize,
    pub arbitration_candidates: usize,
    pub arbitration_merges: usize,
    pub arbitration_failed: bool,
    pub output_entities: usize,
}

impl ResolutionStats {
    pub fn total_merges(&self) -> usize {
        self.exact_merges + self.fuzzy_merges + self.arbitration_merges
    }
}

/// Canonical entities plus the id-remap table of one pass
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One entity per group, ordered by the group's first member
    pub entities: Vec<Entity>,
    /// Every input id -> id of its canonical entity
    pub id_remap: HashMap<String, String>,
    pub stats: ResolutionStats,
}

impl Resolution {
    pub fn canonical_id(&self, id: &str) -> Option<&str> {
        self.id_remap.get(id).map(String::as_str)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Cascading entity resolver.
///
/// Holds configuration only; share one instance (behind `Arc`) across every
/// merge of a reduction so all merges use the same thresholds.
pub struct EntityResolver<M: FuzzyMatcher = ShingleMatcher> {
    config: ResolverConfig,
    matcher: M,
    arbitrator: Option<Arc<dyn Arbitrator>>,
}

impl EntityResolver<ShingleMatcher> {
    /// Create a resolver with the shingle matcher and no arbitrator
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            matcher: ShingleMatcher::new(&config),
            config,
            arbitrator: None,
        }
    }
}

impl Default for EntityResolver<ShingleMatcher> {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl<M: FuzzyMatcher> EntityResolver<M> {
    /// Replace the layer 2 matcher
    pub fn with_matcher<N: FuzzyMatcher>(self, matcher: N) -> EntityResolver<N> {
        EntityResolver {
            config: self.config,
            matcher,
            arbitrator: self.arbitrator,
        }
    }

    /// Attach a layer 3 arbitrator
    pub fn with_arbitrator(mut self, arbitrator: Arc<dyn Arbitrator>) -> Self {
        self.arbitrator = Some(arbitrator);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Layer 3 runs only when enabled and an arbitrator is attached
    pub fn arbitration_enabled(&self) -> bool {
        self.config.enable_arbitration && self.arbitrator.is_some()
    }

    /// Partition `entities` into canonical groups.
    ///
    /// Ids must be unique within `entities`. Never fails: arbitration errors
    /// are logged and treated as "no groups".
    pub async fn resolve(&self, entities: &[Entity]) -> Resolution {
        let n = entities.len();
        if n == 0 {
            return Resolution::default();
        }

        let mut stats = ResolutionStats {
            input_entities: n,
            ..Default::default()
        };
        let mut uf = UnionFind::new(n);

        stats.exact_merges = self.exact_layer(entities, &mut uf);
        stats.fuzzy_merges = self.fuzzy_layer(entities, &mut uf);

        if self.config.enable_arbitration {
            if let Some(arbitrator) = &self.arbitrator {
                self.arbitration_layer(arbitrator.as_ref(), entities, &mut uf, &mut stats)
                    .await;
            }
        }

        let resolution = self.canonicalize(entities, &mut uf, stats);

        debug!(
            input = resolution.stats.input_entities,
            output = resolution.stats.output_entities,
            exact = resolution.stats.exact_merges,
            fuzzy = resolution.stats.fuzzy_merges,
            arbitrated = resolution.stats.arbitration_merges,
            "Resolution pass complete"
        );

        resolution
    }

    /// [`resolve`](Self::resolve) after rejecting empty or duplicate ids
    pub async fn resolve_checked(&self, entities: &[Entity]) -> Result<Resolution> {
        validate_entity_ids(entities, "resolve")?;
        Ok(self.resolve(entities).await)
    }

    /// Layer 1: union every entity onto the first one with the same exact key.
    ///
    /// Blank labels carry no identity and never match here.
    fn exact_layer(&self, entities: &[Entity], uf: &mut UnionFind) -> usize {
        let mut first_seen: HashMap<String, usize> = HashMap::with_capacity(entities.len());
        let mut merges = 0;

        for (i, entity) in entities.iter().enumerate() {
            let key = normalize_exact(&entity.label);
            if key.is_empty() {
                continue;
            }
            match first_seen.get(&key) {
                Some(&first) => {
                    if uf.union(first, i) {
                        merges += 1;
                    }
                }
                None => {
                    first_seen.insert(key, i);
                }
            }
        }

        merges
    }

    /// Layer 2: pairwise fuzzy match over the roots left by layer 1
    fn fuzzy_layer(&self, entities: &[Entity], uf: &mut UnionFind) -> usize {
        let roots: Vec<usize> = (0..entities.len()).filter(|&i| uf.is_root(i)).collect();
        let keys: Vec<Option<M::Key>> = roots
            .iter()
            .map(|&i| self.matcher.key(&entities[i].label))
            .collect();
        let mut merges = 0;

        for a in 0..roots.len() {
            if !uf.is_root(roots[a]) {
                continue;
            }
            let Some(key_a) = &keys[a] else {
                continue;
            };

            for b in (a + 1)..roots.len() {
                let Some(key_b) = &keys[b] else {
                    continue;
                };
                if uf.connected(roots[a], roots[b]) {
                    continue;
                }
                if self.matcher.is_match(key_a, key_b) && uf.union(roots[a], roots[b]) {
                    merges += 1;
                }
            }
        }

        merges
    }

    /// Layer 3: one batched arbitration call over the remaining singletons
    async fn arbitration_layer(
        &self,
        arbitrator: &dyn Arbitrator,
        entities: &[Entity],
        uf: &mut UnionFind,
        stats: &mut ResolutionStats,
    ) {
        let singletons: Vec<usize> = (0..entities.len())
            .filter(|&i| uf.group_size(i) == 1)
            .collect();
        if singletons.len() < 2 {
            return;
        }

        let request = ArbitrationRequest::from_entities(
            entities,
            &singletons,
            self.config.arbitration_snippet_chars,
        );
        stats.arbitration_candidates = request.len();

        let response = match arbitrator.arbitrate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    error = %e,
                    candidates = request.len(),
                    "Arbitration failed, leaving singletons unresolved"
                );
                stats.arbitration_failed = true;
                return;
            }
        };

        let (groups, discarded) = response.validated_groups(&request.indices());
        if discarded > 0 {
            warn!(discarded, "Ignored arbitration indices outside the singleton set");
        }

        for group in groups {
            let anchor = group[0];
            for &other in &group[1..] {
                if uf.union(anchor, other) {
                    stats.arbitration_merges += 1;
                }
            }
        }
    }

    fn canonicalize(
        &self,
        entities: &[Entity],
        uf: &mut UnionFind,
        mut stats: ResolutionStats,
    ) -> Resolution {
        let groups = uf.groups();
        let mut canonical_entities = Vec::with_capacity(groups.len());
        let mut id_remap = HashMap::with_capacity(entities.len());

        for members in &groups {
            let canonical = self.merge_group(entities, members);
            for &m in members {
                id_remap.insert(entities[m].id.clone(), canonical.id.clone());
            }
            canonical_entities.push(canonical);
        }

        stats.output_entities = canonical_entities.len();
        Resolution {
            entities: canonical_entities,
            id_remap,
            stats,
        }
    }

    /// Build the canonical entity of one group (members in index order)
    fn merge_group(&self, entities: &[Entity], members: &[usize]) -> Entity {
        if members.len() == 1 {
            return entities[members[0]].clone();
        }

        // Longest label, first occurrence on ties; its id becomes canonical.
        let mut basis = members[0];
        for &m in &members[1..] {
            if entities[m].label.chars().count() > entities[basis].label.chars().count() {
                basis = m;
            }
        }
        let mut canonical = entities[basis].clone();

        let mut definitions: Vec<&str> = Vec::new();
        for &m in members {
            let definition = entities[m].definition.trim();
            if !definition.is_empty() && !definitions.contains(&definition) {
                definitions.push(definition);
            }
        }
        if !definitions.is_empty() {
            let joined = definitions.join(&self.config.definition_separator);
            canonical.definition = truncate_chars(joined, self.config.definition_max_chars);
        }

        if let Some(entity_type) = majority_type(entities, members) {
            canonical.entity_type = entity_type;
        }

        canonical.importance = members
            .iter()
            .map(|&m| entities[m].importance)
            .max()
            .unwrap_or_default();

        canonical
    }
}

/// Most frequent non-empty type; the first seen wins ties
fn majority_type(entities: &[Entity], members: &[usize]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for &m in members {
        let entity_type = entities[m].entity_type.as_str();
        if entity_type.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(t, _)| *t == entity_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((entity_type, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (entity_type, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((entity_type, count));
        }
    }
    best.map(|(t, _)| t.to_string())
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
