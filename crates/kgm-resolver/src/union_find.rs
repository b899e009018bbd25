//! Disjoint-set forest over entity indices

/// Union-find with path compression.
///
/// Indices are positions in the batch being resolved. The structure lives for
/// a single resolution pass and is never shared between passes.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    /// `n` singleton sets, `0..n`
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `x`, halving the path on the way up
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Join the sets of `a` and `b`; the root of `a` survives.
    ///
    /// Returns `false` when they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        self.parent[root_b] = root_a;
        self.size[root_a] += self.size[root_b];
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn is_root(&self, x: usize) -> bool {
        self.parent[x] == x
    }

    /// Number of members in the set containing `x`
    pub fn group_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }

    /// All sets, ordered by their lowest member; members ascending
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for i in 0..n {
            let root = self.find(i);
            match slot_of_root[root] {
                Some(slot) => groups[slot].push(i),
                None => {
                    slot_of_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut uf = UnionFind::new(3);
        assert_eq!(uf.groups(), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(uf.group_size(1), 1);
    }

    #[test]
    fn test_union_and_find() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 3));
        assert!(uf.union(3, 4));
        assert!(!uf.union(4, 0));

        assert!(uf.connected(0, 4));
        assert!(!uf.connected(1, 4));
        assert_eq!(uf.group_size(4), 3);
        assert_eq!(uf.find(4), 0);
    }

    #[test]
    fn test_first_root_survives() {
        let mut uf = UnionFind::new(4);
        uf.union(2, 1);
        assert!(uf.is_root(2));
        assert!(!uf.is_root(1));
    }

    #[test]
    fn test_groups_ordered_by_lowest_member() {
        let mut uf = UnionFind::new(6);
        uf.union(5, 1);
        uf.union(4, 2);
        uf.union(2, 0);

        assert_eq!(uf.groups(), vec![vec![0, 2, 4], vec![1, 5], vec![3]]);
    }

    #[test]
    fn test_empty() {
        let mut uf = UnionFind::new(0);
        assert!(uf.is_empty());
        assert!(uf.groups().is_empty());
    }
}
