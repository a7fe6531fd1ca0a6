//! Local traversals over the spacetime graph.
//!
//! All searches keep their visited sets in hash maps sized by what they
//! touch, not by `N`, so a bounded search stays local.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::model::EdgeKey;
use super::Graph;

/// Shortest hop distance from `from` to `to`, if it is at most `max_hops`.
///
/// BFS stops as soon as the frontier passes `max_hops` or reaches `to`.
pub fn hop_distance(graph: &Graph, from: usize, to: usize, max_hops: usize) -> Option<usize> {
    if !graph.contains(from) || !graph.contains(to) {
        return None;
    }
    if from == to {
        return Some(0);
    }
    let mut seen: HashSet<usize> = HashSet::new();
    seen.insert(from);
    let mut frontier = vec![from];
    for depth in 1..=max_hops {
        let mut next = Vec::new();
        for &u in &frontier {
            for &v in graph.neighbors(u) {
                if v == to {
                    return Some(depth);
                }
                if seen.insert(v) {
                    next.push(v);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    None
}

/// Fewest-hop path `from -> ... -> to` that uses none of the `excluded`
/// edges. Returns the node sequence including both endpoints.
pub fn alternate_path(
    graph: &Graph,
    from: usize,
    to: usize,
    excluded: &[EdgeKey],
) -> Option<Vec<usize>> {
    if !graph.contains(from) || !graph.contains(to) || from == to {
        return None;
    }
    let mut parent: HashMap<usize, usize> = HashMap::new();
    parent.insert(from, from);
    let mut queue = VecDeque::from([from]);

    while let Some(u) = queue.pop_front() {
        for &v in graph.neighbors(u) {
            if parent.contains_key(&v) {
                continue;
            }
            if EdgeKey::new(u, v).is_some_and(|k| excluded.contains(&k)) {
                continue;
            }
            parent.insert(v, u);
            if v == to {
                let mut path = vec![to];
                let mut cur = to;
                while cur != from {
                    cur = parent[&cur];
                    path.push(cur);
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(v);
        }
    }
    None
}

/// Nodes adjacent to both `i` and `j` (apexes of triangles on edge `i-j`).
pub fn common_neighbors(graph: &Graph, i: usize, j: usize) -> SmallVec<[usize; 8]> {
    let (small, large) = if graph.degree(i) <= graph.degree(j) { (i, j) } else { (j, i) };
    let large_adj = graph.neighbors(large);
    graph
        .neighbors(small)
        .iter()
        .copied()
        .filter(|k| *k != large && large_adj.contains(k))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    dist: f64,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Min-heap on distance.
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist).then_with(|| other.node.cmp(&self.node))
    }
}

/// Weighted geodesic distance with edge length `1 / weight`.
///
/// Strong coupling means short distance. `None` if `to` is unreachable.
pub fn geodesic_distance(graph: &Graph, from: usize, to: usize) -> Option<f64> {
    if !graph.contains(from) || !graph.contains(to) {
        return None;
    }
    let mut best: HashMap<usize, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(from, 0.0);
    heap.push(Frontier { dist: 0.0, node: from });

    while let Some(Frontier { dist, node }) = heap.pop() {
        if node == to {
            return Some(dist);
        }
        if best.get(&node).is_some_and(|d| dist > *d) {
            continue;
        }
        for &v in graph.neighbors(node) {
            let Some(w) = graph.weight(node, v) else { continue };
            if w <= 0.0 {
                continue;
            }
            let candidate = dist + 1.0 / w;
            if best.get(&v).is_none_or(|d| candidate < *d) {
                best.insert(v, candidate);
                heap.push(Frontier { dist: candidate, node: v });
            }
        }
    }
    None
}
