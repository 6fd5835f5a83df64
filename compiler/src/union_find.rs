// union_find.rs — Disjoint-set forest over ordered keys
//
// Path compression plus union by rank. Ties keep the first argument's root
// as the representative, so identical input sequences give identical
// partitions.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct UnionFind<K: Ord + Copy> {
    parent: BTreeMap<K, K>,
    rank: BTreeMap<K, u32>,
}

impl<K: Ord + Copy> UnionFind<K> {
    pub fn new() -> Self {
        Self {
            parent: BTreeMap::new(),
            rank: BTreeMap::new(),
        }
    }

    /// Add `key` as its own singleton class. No-op if already present.
    pub fn make_set(&mut self, key: K) {
        self.parent.entry(key).or_insert(key);
        self.rank.entry(key).or_insert(0);
    }

    pub fn contains(&self, key: K) -> bool {
        self.parent.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Root of `key`'s class, compressing the path. `None` if `key` was
    /// never added.
    pub fn find(&mut self, key: K) -> Option<K> {
        let mut root = *self.parent.get(&key)?;
        loop {
            let next = self.parent[&root];
            if next == root {
                break;
            }
            root = next;
        }
        let mut cur = key;
        while cur != root {
            let next = self.parent[&cur];
            self.parent.insert(cur, root);
            cur = next;
        }
        Some(root)
    }

    /// Root of `key`'s class without mutating the forest.
    pub fn root(&self, key: K) -> Option<K> {
        let mut cur = *self.parent.get(&key)?;
        loop {
            let next = self.parent[&cur];
            if next == cur {
                return Some(cur);
            }
            cur = next;
        }
    }

    /// Merge the classes of `a` and `b`; returns the surviving root.
    pub fn union(&mut self, a: K, b: K) -> Option<K> {
        let ra = self.find(a)?;
        let rb = self.find(b)?;
        if ra == rb {
            return Some(ra);
        }
        let rank_a = self.rank[&ra];
        let rank_b = self.rank[&rb];
        let (root, child) = if rank_a < rank_b { (rb, ra) } else { (ra, rb) };
        self.parent.insert(child, root);
        if rank_a == rank_b {
            if let Some(r) = self.rank.get_mut(&root) {
                *r += 1;
            }
        }
        Some(root)
    }

    /// All classes, each sorted, ordered by their smallest member.
    pub fn classes(&self) -> Vec<Vec<K>> {
        let mut by_root: BTreeMap<K, Vec<K>> = BTreeMap::new();
        for &key in self.parent.keys() {
            if let Some(root) = self.root(key) {
                by_root.entry(root).or_default().push(key);
            }
        }
        let mut classes: Vec<Vec<K>> = by_root.into_values().collect();
        classes.sort_by_key(|c| c[0]);
        classes
    }

    /// Mapping from every key to its representative.
    pub fn representatives(&self) -> BTreeMap<K, K> {
        self.parent
            .keys()
            .filter_map(|&k| self.root(k).map(|r| (k, r)))
            .collect()
    }
}
