//! # Graph Spacetime Arena
//!
//! Dense node records addressed by index plus a symmetric weighted
//! adjacency. Weights live in `(0, 1]`; an absent edge has no entry.
//!
//! ## Single-writer discipline
//!
//! Structural mutation (`insert_edge`, `remove_edge`, `set_weight`) is
//! crate-private and only reached from the topology engine. Every
//! committed create/remove bumps `topology_version`, which downstream
//! caches (colouring, field modules) compare against instead of being
//! dirtied implicitly.
//!
//! ## Caches
//!
//! | Cache | Maintenance |
//! |-------|-------------|
//! | degree | incremental; `recalculate_all_degrees()` rebuilds |
//! | total weight | incremental |
//! | bipartite parity | lazy, rebuilt by `refresh_caches()` on version change |

pub mod traversal;

use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use crate::model::{EdgeKey, NodeRecord, NodeState};
use crate::{Error, Result};

/// Neighbour list; most spacetime nodes have low degree.
pub type Neighbors = SmallVec<[usize; 8]>;

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<NodeRecord>,
    adjacency: Vec<Neighbors>,
    weights: HashMap<EdgeKey, f64>,
    degree: Vec<usize>,
    total_weight: f64,
    parity: Vec<u8>,
    parity_version: Option<u64>,
    topology_version: u64,
}

impl Graph {
    // ========================================================================
    // Construction
    // ========================================================================

    /// `n` isolated nodes at rest.
    pub fn new(n: usize) -> Self {
        Self {
            nodes: vec![NodeRecord::default(); n],
            adjacency: vec![Neighbors::new(); n],
            weights: HashMap::new(),
            degree: vec![0; n],
            total_weight: 0.0,
            parity: vec![0; n],
            parity_version: None,
            topology_version: 0,
        }
    }

    /// Cycle `0-1-...-(n-1)-0` with uniform weight.
    pub fn ring(n: usize, weight: f64) -> Result<Self> {
        let mut graph = Self::new(n);
        if n >= 2 {
            for i in 0..n {
                let j = (i + 1) % n;
                if i != j && !graph.has_edge(i, j) {
                    graph.add_edge(i, j, weight)?;
                }
            }
        }
        Ok(graph)
    }

    pub fn from_edges(n: usize, edges: &[(usize, usize, f64)]) -> Result<Self> {
        let mut graph = Self::new(n);
        for &(i, j, w) in edges {
            graph.add_edge(i, j, w)?;
        }
        Ok(graph)
    }

    /// Erdős–Rényi graph: each pair is linked with probability `p`.
    pub fn random(n: usize, p: f64, weight: f64, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut graph = Self::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if rng.gen_range(0.0..1.0) < p {
                    graph.add_edge(i, j, weight)?;
                }
            }
        }
        Ok(graph)
    }

    /// Checked edge insertion for graph setup. Overwrites the weight of an
    /// existing edge.
    pub fn add_edge(&mut self, i: usize, j: usize, weight: f64) -> Result<()> {
        self.check_node(i)?;
        self.check_node(j)?;
        if i == j {
            return Err(Error::SelfLoop(i));
        }
        if !(weight.is_finite() && weight > 0.0 && weight <= 1.0) {
            return Err(Error::InvalidWeight(weight));
        }
        if !self.set_weight(i, j, weight) {
            self.insert_edge(i, j, weight);
        }
        Ok(())
    }

    fn check_node(&self, i: usize) -> Result<()> {
        if i < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::InvalidNode { node: i, count: self.nodes.len() })
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, i: usize) -> bool {
        i < self.nodes.len()
    }

    pub fn node(&self, i: usize) -> Option<&NodeRecord> {
        self.nodes.get(i)
    }

    pub fn node_mut(&mut self, i: usize) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(i)
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn state(&self, i: usize) -> Option<NodeState> {
        self.nodes.get(i).map(|n| n.state)
    }

    /// Set a node's discrete state (initial conditions, external stimuli).
    pub fn set_state(&mut self, i: usize, state: NodeState) -> bool {
        match self.nodes.get_mut(i) {
            Some(node) => {
                node.state = state;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        EdgeKey::new(i, j).is_some_and(|k| self.weights.contains_key(&k))
    }

    pub fn weight(&self, i: usize, j: usize) -> Option<f64> {
        EdgeKey::new(i, j).and_then(|k| self.weights.get(&k).copied())
    }

    /// Neighbours of `i`; empty for an out-of-range index.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        self.adjacency.get(i).map_or(&[], |n| n.as_slice())
    }

    pub fn degree(&self, i: usize) -> usize {
        self.degree.get(i).copied().unwrap_or(0)
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degree
    }

    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    /// Sum of all edge weights (the graph's "volume").
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, f64)> + '_ {
        self.weights.iter().map(|(k, w)| (*k, *w))
    }

    /// Edge keys in canonical order.
    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        let mut keys: Vec<EdgeKey> = self.weights.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    // ========================================================================
    // Mutation (topology engine only)
    // ========================================================================

    /// Insert an absent edge. Returns `false` if it already exists or the
    /// endpoints are malformed.
    pub(crate) fn insert_edge(&mut self, i: usize, j: usize, weight: f64) -> bool {
        let Some(key) = EdgeKey::new(i, j) else { return false };
        if !self.contains(key.hi) || self.weights.contains_key(&key) {
            return false;
        }
        self.weights.insert(key, weight);
        self.adjacency[key.lo].push(key.hi);
        self.adjacency[key.hi].push(key.lo);
        self.degree[key.lo] += 1;
        self.degree[key.hi] += 1;
        self.total_weight += weight;
        self.bump_version();
        true
    }

    /// Remove an edge, returning its weight.
    pub(crate) fn remove_edge(&mut self, i: usize, j: usize) -> Option<f64> {
        let key = EdgeKey::new(i, j)?;
        let weight = self.weights.remove(&key)?;
        self.adjacency[key.lo].retain(|n| *n != key.hi);
        self.adjacency[key.hi].retain(|n| *n != key.lo);
        self.degree[key.lo] -= 1;
        self.degree[key.hi] -= 1;
        self.total_weight -= weight;
        if self.weights.is_empty() {
            self.total_weight = 0.0;
        }
        self.bump_version();
        Some(weight)
    }

    /// Reweight an existing edge. Not a structural change.
    pub(crate) fn set_weight(&mut self, i: usize, j: usize, weight: f64) -> bool {
        let Some(key) = EdgeKey::new(i, j) else { return false };
        match self.weights.get_mut(&key) {
            Some(w) => {
                self.total_weight += weight - *w;
                *w = weight;
                true
            }
            None => false,
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [NodeRecord] {
        &mut self.nodes
    }

    fn bump_version(&mut self) {
        self.topology_version += 1;
    }

    // ========================================================================
    // Caches
    // ========================================================================

    /// Rebuild the degree cache from adjacency.
    pub fn recalculate_all_degrees(&mut self) {
        for (d, adj) in self.degree.iter_mut().zip(&self.adjacency) {
            *d = adj.len();
        }
    }

    /// Rebuild stale lazy caches. Cheap when nothing changed.
    pub fn refresh_caches(&mut self) {
        if self.parity_version != Some(self.topology_version) {
            self.rebuild_parity();
            self.parity_version = Some(self.topology_version);
        }
    }

    /// Bipartite colour (0 or 1) as of the last `refresh_caches()`.
    pub fn parity(&self, i: usize) -> u8 {
        debug_assert!(self.parity_version == Some(self.topology_version), "parity cache is stale");
        self.parity.get(i).copied().unwrap_or(0)
    }

    pub fn same_parity(&self, i: usize, j: usize) -> bool {
        self.parity(i) == self.parity(j)
    }

    /// BFS 2-colouring. Odd cycles leave some adjacent pairs with equal
    /// colour; those are the edges the chirality term penalises.
    fn rebuild_parity(&mut self) {
        let n = self.nodes.len();
        let mut colour: Vec<Option<u8>> = vec![None; n];
        let mut queue = std::collections::VecDeque::new();
        for start in 0..n {
            if colour[start].is_some() {
                continue;
            }
            colour[start] = Some(0);
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                let c = colour[u].unwrap_or(0);
                for &v in &self.adjacency[u] {
                    if colour[v].is_none() {
                        colour[v] = Some(1 - c);
                        queue.push_back(v);
                    }
                }
            }
        }
        self.parity = colour.into_iter().map(|c| c.unwrap_or(0)).collect();
    }
}
