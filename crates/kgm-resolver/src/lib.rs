//! kgmerge Resolver - Cross-chunk entity resolution and graph reduction
//!
//! Chunk-graphs extracted independently from one document are merged into a
//! single graph:
//! - Three-layer cascading resolver (exact, fuzzy, arbitration)
//! - Relationship remapping onto canonical ids
//! - Pairwise merge and parallel binary-tree reduction

pub mod arbitration;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod reduce;
pub mod remap;
pub mod resolver;
pub mod union_find;

pub use arbitration::{
    ArbitrationCandidate, ArbitrationRequest, ArbitrationResponse, Arbitrator, LlmArbitrator,
};
pub use matcher::{FuzzyMatcher, ShingleMatcher};
pub use merge::merge_two;
pub use normalize::EntropyGate;
pub use reduce::{reduce, ParallelMerger, ReductionStats};
pub use remap::{remap, remap_relationships, DanglingPolicy};
pub use resolver::{EntityResolver, Resolution, ResolutionStats};
pub use union_find::UnionFind;
