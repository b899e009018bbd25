//! Parallel binary reduction of chunk-graphs
//!
//! N chunk-graphs are reduced to one in O(log N) rounds:
//!
//! ```text
//! [G0 .. G7] -> [G01, G23, G45, G67]   4 concurrent merges
//!            -> [G0123, G4567]         2 concurrent merges
//!            -> [G01234567]            1 merge
//! ```
//!
//! Pairing is fixed by position and results are collected in dispatch order,
//! so the outcome never depends on which worker finishes first.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::info;

use kgm_core::{ChunkResult, KgmError, KnowledgeGraph, MergeConfig, MergedResult, Result, TokenUsage};

use crate::matcher::{FuzzyMatcher, ShingleMatcher};
use crate::merge::merge_pair;
use crate::resolver::{EntityResolver, ResolutionStats};

/// Counters for one reduction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReductionStats {
    pub chunks: usize,
    pub rounds: usize,
    pub merges: usize,
    pub input_entities: usize,
    pub input_relationships: usize,
    pub output_entities: usize,
    pub output_relationships: usize,
    pub exact_merges: usize,
    pub fuzzy_merges: usize,
    pub arbitration_merges: usize,
    pub arbitration_failures: usize,
}

impl ReductionStats {
    fn absorb(&mut self, pass: &ResolutionStats) {
        self.merges += 1;
        self.exact_merges += pass.exact_merges;
        self.fuzzy_merges += pass.fuzzy_merges;
        self.arbitration_merges += pass.arbitration_merges;
        if pass.arbitration_failed {
            self.arbitration_failures += 1;
        }
    }
}

/// Drives pairwise merges over a fixed batch of chunk-graphs
pub struct ParallelMerger<M: FuzzyMatcher = ShingleMatcher> {
    resolver: Arc<EntityResolver<M>>,
    max_workers: usize,
    chunk_prefix: String,
}

impl<M: FuzzyMatcher + 'static> ParallelMerger<M> {
    pub fn new(resolver: Arc<EntityResolver<M>>) -> Self {
        let defaults = MergeConfig::default();
        Self {
            resolver,
            max_workers: defaults.max_workers,
            chunk_prefix: defaults.chunk_prefix,
        }
    }

    pub fn from_config(resolver: Arc<EntityResolver<M>>, config: &MergeConfig) -> Self {
        Self::new(resolver)
            .with_max_workers(config.max_workers)
            .with_chunk_prefix(config.chunk_prefix.clone())
    }

    /// Upper bound on concurrent merges per round (at least 1)
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_chunk_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.chunk_prefix = prefix.into();
        self
    }

    pub fn resolver(&self) -> &EntityResolver<M> {
        &self.resolver
    }

    /// Reduce `chunk_graphs` to a single graph
    pub async fn reduce(&self, chunk_graphs: Vec<KnowledgeGraph>) -> Result<KnowledgeGraph> {
        self.reduce_with_stats(chunk_graphs)
            .await
            .map(|(graph, _)| graph)
    }

    /// Reduce `chunk_graphs` and report what happened.
    ///
    /// An empty batch yields an empty graph; a single graph is returned as is,
    /// without resolving it.
    pub async fn reduce_with_stats(
        &self,
        chunk_graphs: Vec<KnowledgeGraph>,
    ) -> Result<(KnowledgeGraph, ReductionStats)> {
        let mut stats = ReductionStats {
            chunks: chunk_graphs.len(),
            input_entities: chunk_graphs.iter().map(|g| g.entities.len()).sum(),
            input_relationships: chunk_graphs.iter().map(|g| g.relationships.len()).sum(),
            ..Default::default()
        };

        if chunk_graphs.len() <= 1 {
            let graph = chunk_graphs.into_iter().next().unwrap_or_default();
            stats.output_entities = graph.entities.len();
            stats.output_relationships = graph.relationships.len();
            return Ok((graph, stats));
        }

        let mut current = self.make_unique_ids(chunk_graphs)?;

        while current.len() > 1 {
            stats.rounds += 1;
            current = self.run_round(current, stats.rounds, &mut stats).await?;
        }

        let graph = current
            .pop()
            .ok_or_else(|| KgmError::Internal("reduction produced no graph".to_string()))?;
        stats.output_entities = graph.entities.len();
        stats.output_relationships = graph.relationships.len();

        info!(
            chunks = stats.chunks,
            rounds = stats.rounds,
            merges = stats.merges,
            input_entities = stats.input_entities,
            output_entities = stats.output_entities,
            output_relationships = stats.output_relationships,
            arbitration_failures = stats.arbitration_failures,
            "Reduction complete"
        );

        Ok((graph, stats))
    }

    /// Merge chunk extraction results, summing their token usage
    pub async fn merge_chunk_results(&self, results: Vec<ChunkResult>) -> Result<MergedResult> {
        let tokens: TokenUsage = results.iter().map(|r| r.tokens).sum();
        let graphs = results.into_iter().map(|r| r.graph).collect();
        let graph = self.reduce(graphs).await?;
        Ok(MergedResult { graph, tokens })
    }

    /// Check each chunk's ids are unique, then prefix them with the chunk tag
    fn make_unique_ids(&self, graphs: Vec<KnowledgeGraph>) -> Result<Vec<KnowledgeGraph>> {
        graphs
            .into_iter()
            .enumerate()
            .map(|(i, graph)| {
                graph.validate_unique_ids(&format!("chunk {i}"))?;
                Ok(graph.with_id_prefix(&format!("{}{}_", self.chunk_prefix, i)))
            })
            .collect()
    }

    async fn run_round(
        &self,
        graphs: Vec<KnowledgeGraph>,
        round: usize,
        stats: &mut ReductionStats,
    ) -> Result<Vec<KnowledgeGraph>> {
        let mut pairs = Vec::with_capacity(graphs.len() / 2);
        let mut leftover = None;
        let mut iter = graphs.into_iter();
        loop {
            match (iter.next(), iter.next()) {
                (Some(a), Some(b)) => pairs.push((a, b)),
                (Some(a), None) => {
                    leftover = Some(a);
                    break;
                }
                _ => break,
            }
        }

        let workers = self.max_workers.min(pairs.len()).max(1);
        info!(
            round,
            pairs = pairs.len(),
            workers,
            carried = leftover.is_some(),
            "Starting merge round"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| KgmError::Internal(format!("worker pool closed: {e}")))?;
                merge_pair(a, b, &resolver).await
            }));
        }

        // Await every task before reporting, in dispatch order.
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await);
        }

        let mut merged = Vec::with_capacity(outcomes.len() + 1);
        for outcome in outcomes {
            let (graph, pass) = outcome
                .map_err(|e| KgmError::Internal(format!("merge task failed: {e}")))??;
            stats.absorb(&pass);
            merged.push(graph);
        }

        if let Some(graph) = leftover {
            merged.push(graph);
        }
        Ok(merged)
    }
}

/// Reduce `chunk_graphs` with a shared resolver and at most `max_workers`
/// concurrent merges per round
pub async fn reduce<M: FuzzyMatcher + 'static>(
    chunk_graphs: Vec<KnowledgeGraph>,
    resolver: Arc<EntityResolver<M>>,
    max_workers: usize,
) -> Result<KnowledgeGraph> {
    ParallelMerger::new(resolver)
        .with_max_workers(max_workers)
        .reduce(chunk_graphs)
        .await
}
