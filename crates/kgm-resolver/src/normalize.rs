//! Label normalization and comparison keys
//!
//! Pure functions, no state. Two normal forms are used:
//! - exact key: lowercase, whitespace collapsed (Layer 1)
//! - fuzzy key: lowercase, alphanumerics and spaces only (Layer 2)

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use kgm_core::ResolverConfig;

/// Exact-match key: lowercase, trimmed, whitespace runs collapsed to one space
pub fn normalize_exact(label: &str) -> String {
    label
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fuzzy key: lowercase, keep alphanumerics and spaces, trimmed
pub fn normalize_fuzzy(label: &str) -> String {
    let kept: String = label
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    kept.trim().to_string()
}

/// Character-level Shannon entropy in bits, spaces ignored
pub fn shannon_entropy(text: &str) -> f64 {
    // BTreeMap keeps the summation order stable across runs.
    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    let mut total = 0usize;
    for c in text.chars().filter(|c| *c != ' ') {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// Character n-grams of the fuzzy key.
///
/// A key shorter than `n` yields itself as the only shingle; an empty key
/// yields no shingles.
pub fn shingles(label: &str, n: usize) -> HashSet<String> {
    let key = normalize_fuzzy(label);
    if key.is_empty() {
        return HashSet::new();
    }

    let chars: Vec<char> = key.chars().collect();
    let n = n.max(1);
    if chars.len() < n {
        return HashSet::from([key]);
    }

    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity; 0.0 when either set is empty
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

// ============================================================================
// Entropy gate
// ============================================================================

/// Withholds short or repetitive labels from fuzzy matching.
///
/// "Lock", "API", "Mutex" fail the gate; "Condition Variable" passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyGate {
    /// Minimum entropy in bits
    pub threshold: f64,
    /// Labels shorter than this (in characters)...
    pub min_length: usize,
    /// ...with fewer tokens than this always fail
    pub min_tokens: usize,
}

impl Default for EntropyGate {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            min_length: 6,
            min_tokens: 2,
        }
    }
}

impl From<&ResolverConfig> for EntropyGate {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            threshold: config.entropy_threshold,
            min_length: config.min_label_length,
            min_tokens: config.min_token_count,
        }
    }
}

impl EntropyGate {
    /// Whether `label` carries enough information for shingle scoring
    pub fn passes(&self, label: &str) -> bool {
        self.passes_fuzzy_key(&normalize_fuzzy(label))
    }

    /// Same as [`passes`](Self::passes) for an already fuzzy-normalized key
    pub fn passes_fuzzy_key(&self, key: &str) -> bool {
        let length = key.chars().count();
        let tokens = key.split_whitespace().count();
        if length < self.min_length && tokens < self.min_tokens {
            return false;
        }
        shannon_entropy(key) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exact() {
        assert_eq!(normalize_exact("  Bounded   Buffer "), "bounded buffer");
        assert_eq!(normalize_exact("Condition\tVariable"), "condition variable");
        assert_eq!(normalize_exact("wait()"), "wait()");
        assert_eq!(normalize_exact(""), "");
    }

    #[test]
    fn test_normalize_fuzzy() {
        assert_eq!(normalize_fuzzy("wait()"), "wait");
        assert_eq!(normalize_fuzzy(" Mesa-Semantics! "), "mesasemantics");
        assert_eq!(normalize_fuzzy("Reader/Writer Lock"), "readerwriter lock");
    }

    #[test]
    fn test_shannon_entropy() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("ab") - 1.0).abs() < 1e-9);
        assert!((shannon_entropy("lock") - 2.0).abs() < 1e-9);
        // spaces are ignored
        assert!((shannon_entropy("a b") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_gate_short_labels() {
        let gate = EntropyGate::default();
        assert!(!gate.passes("Lock"));
        assert!(!gate.passes("API"));
        assert!(!gate.passes("Mutex"));
    }

    #[test]
    fn test_entropy_gate_informative_labels() {
        let gate = EntropyGate::default();
        assert!(gate.passes("Condition Variable"));
        assert!(gate.passes("Bounded Buffer"));
        assert!(gate.passes("Semaphore"));
    }

    #[test]
    fn test_entropy_gate_repetitive_label() {
        let gate = EntropyGate::default();
        // long enough, but almost no information
        assert!(!gate.passes("aaaaaaaab"));
    }

    #[test]
    fn test_shingles() {
        let s = shingles("ABCD", 3);
        assert_eq!(s.len(), 2);
        assert!(s.contains("abc"));
        assert!(s.contains("bcd"));

        assert_eq!(shingles("ab", 3), HashSet::from(["ab".to_string()]));
        assert!(shingles("!!", 3).is_empty());
    }

    #[test]
    fn test_shingles_keep_spaces() {
        let s = shingles("a bc", 3);
        assert!(s.contains("a b"));
        assert!(s.contains(" bc"));
    }

    #[test]
    fn test_jaccard() {
        let a: HashSet<&str> = ["x", "y", "z"].into();
        let b: HashSet<&str> = ["y", "z", "w"].into();
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }
}
