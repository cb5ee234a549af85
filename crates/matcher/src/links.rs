//! Union-find construction of links from accepted pairs.

use hashbrown::HashMap;
use index::RowRef;

use crate::types::{LinkSet, RowLink, ScoredPair};

/// Incrementally merges accepted pairs into equivalence classes.
///
/// Rows are interned into an arena on first sight; classes are tracked with
/// path compression and union by rank, and each root keeps the best (lowest)
/// pair score seen inside its class. The resulting groups do not depend on
/// the order pairs arrive in.
#[derive(Debug, Default)]
pub struct LinkBuilder {
    slots: HashMap<RowRef, usize>,
    refs: Vec<RowRef>,
    parent: Vec<usize>,
    rank: Vec<u8>,
    best: Vec<f64>,
    pairs: usize,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(rows: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(rows),
            refs: Vec::with_capacity(rows),
            parent: Vec::with_capacity(rows),
            rank: Vec::with_capacity(rows),
            best: Vec::with_capacity(rows),
            pairs: 0,
        }
    }

    /// Rows seen so far.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Pairs added so far.
    pub fn pair_count(&self) -> usize {
        self.pairs
    }

    pub fn contains(&self, r: RowRef) -> bool {
        self.slots.contains_key(&r)
    }

    pub fn add_pair(&mut self, pair: &ScoredPair) {
        self.pairs += 1;
        let x = self.slot(pair.a);
        let y = self.slot(pair.b);
        let root = self.union(x, y);
        if pair.score < self.best[root] {
            self.best[root] = pair.score;
        }
    }

    pub fn extend<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = &'a ScoredPair>,
    {
        for pair in pairs {
            self.add_pair(pair);
        }
    }

    /// Emit every class with at least two members.
    pub fn finish(mut self) -> LinkSet {
        let mut groups: HashMap<usize, Vec<RowRef>> = HashMap::new();
        for slot in 0..self.refs.len() {
            let root = self.find(slot);
            groups.entry(root).or_default().push(self.refs[slot]);
        }
        let links = groups
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(root, members)| {
                let best = self.best[root];
                RowLink::new(members, best.is_finite().then_some(best))
            })
            .collect();
        LinkSet::new(links)
    }

    fn slot(&mut self, r: RowRef) -> usize {
        if let Some(&s) = self.slots.get(&r) {
            return s;
        }
        let s = self.refs.len();
        self.slots.insert(r, s);
        self.refs.push(r);
        self.parent.push(s);
        self.rank.push(0);
        self.best.push(f64::INFINITY);
        s
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the classes of `x` and `y`, returning the surviving root.
    fn union(&mut self, x: usize, y: usize) -> usize {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return rx;
        }
        let (root, child) = match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => (ry, rx),
            std::cmp::Ordering::Greater => (rx, ry),
            std::cmp::Ordering::Equal => {
                self.rank[rx] = self.rank[rx].saturating_add(1);
                (rx, ry)
            }
        };
        self.parent[child] = root;
        if self.best[child] < self.best[root] {
            self.best[root] = self.best[child];
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(i: usize) -> RowRef {
        RowRef::new(0, i)
    }

    fn p(x: usize, y: usize, s: f64) -> ScoredPair {
        ScoredPair::new(r(x), r(y), s)
    }

    #[test]
    fn transitive_pairs_form_one_link() {
        let mut b = LinkBuilder::new();
        b.extend(&[p(0, 1, 0.5), p(1, 2, 0.2)]);
        let set = b.finish();
        assert_eq!(set.len(), 1);
        let link = set.iter().next().unwrap();
        assert_eq!(link.refs(), &[r(0), r(1), r(2)]);
        assert_eq!(link.score, Some(0.2));
    }

    #[test]
    fn separate_components_stay_apart() {
        let mut b = LinkBuilder::new();
        b.extend(&[p(5, 6, 0.1), p(0, 1, 0.3), p(2, 3, 0.0)]);
        let set = b.finish();
        assert_eq!(set.len(), 3);
        assert!(set.partition_ok());
        let firsts: Vec<RowRef> = set.iter().filter_map(|l| l.first()).collect();
        assert_eq!(firsts, vec![r(0), r(2), r(5)]);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let pairs = vec![
            p(0, 9, 0.9),
            p(3, 4, 0.4),
            p(9, 3, 0.1),
            p(7, 8, 0.8),
            p(1, 2, 0.6),
        ];
        let mut forward = LinkBuilder::new();
        forward.extend(&pairs);
        let mut backward = LinkBuilder::new();
        backward.extend(pairs.iter().rev());
        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn repeated_pair_is_harmless() {
        let mut b = LinkBuilder::with_capacity(4);
        b.add_pair(&p(0, 1, 0.5));
        b.add_pair(&p(1, 0, 0.5));
        assert_eq!(b.pair_count(), 2);
        assert_eq!(b.len(), 2);
        assert!(b.contains(r(1)));
        assert_eq!(b.finish().len(), 1);
    }

    #[test]
    fn long_chain_collapses() {
        let mut b = LinkBuilder::new();
        for i in 0..1000 {
            b.add_pair(&p(i, i + 1, 0.5));
        }
        let set = b.finish();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().len(), 1001);
    }

    #[test]
    fn empty_builder_gives_empty_set() {
        assert!(LinkBuilder::new().finish().is_empty());
    }
}
