//! Layer 2 fuzzy matchers
//!
//! The resolver asks a matcher for a comparison key once per candidate
//! label, then scores candidate pairs. Returning `None` from `key` withholds
//! the label from fuzzy matching entirely.

use std::collections::HashSet;

use kgm_core::ResolverConfig;

use crate::normalize::{jaccard, normalize_fuzzy, shingles, EntropyGate};

/// Approximate label matching strategy
pub trait FuzzyMatcher: Send + Sync {
    /// Precomputed comparison key for a label
    type Key;

    /// Key for `label`, or `None` if the label must not be fuzzy-matched
    fn key(&self, label: &str) -> Option<Self::Key>;

    /// Similarity in `[0, 1]`
    fn similarity(&self, a: &Self::Key, b: &Self::Key) -> f64;

    /// Minimum similarity for a merge
    fn threshold(&self) -> f64;

    fn is_match(&self, a: &Self::Key, b: &Self::Key) -> bool {
        self.similarity(a, b) >= self.threshold()
    }
}

/// Entropy-gated character-shingle Jaccard matcher
#[derive(Debug, Clone)]
pub struct ShingleMatcher {
    gate: EntropyGate,
    shingle_size: usize,
    threshold: f64,
}

impl ShingleMatcher {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            gate: EntropyGate::from(config),
            shingle_size: config.shingle_size,
            threshold: config.jaccard_threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn gate(&self) -> &EntropyGate {
        &self.gate
    }
}

impl Default for ShingleMatcher {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl FuzzyMatcher for ShingleMatcher {
    type Key = HashSet<String>;

    fn key(&self, label: &str) -> Option<Self::Key> {
        if !self.gate.passes_fuzzy_key(&normalize_fuzzy(label)) {
            return None;
        }
        Some(shingles(label, self.shingle_size))
    }

    fn similarity(&self, a: &Self::Key, b: &Self::Key) -> f64 {
        jaccard(a, b)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
