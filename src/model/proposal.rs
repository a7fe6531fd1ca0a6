//! Edge keys and Metropolis proposals.

use serde::{Deserialize, Serialize};

/// Canonical undirected edge key with `lo < hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub lo: usize,
    pub hi: usize,
}

impl EdgeKey {
    /// Returns `None` for self-loops.
    pub fn new(i: usize, j: usize) -> Option<Self> {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => Some(Self { lo: i, hi: j }),
            std::cmp::Ordering::Greater => Some(Self { lo: j, hi: i }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The other endpoint, if `node` is one of them.
    pub fn other(&self, node: usize) -> Option<usize> {
        if node == self.lo { Some(self.hi) }
        else if node == self.hi { Some(self.lo) }
        else { None }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lo, self.hi)
    }
}

/// Kind of structural move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    Create,
    Remove,
    Reweight,
}

/// Ephemeral proposal living for one Metropolis step.
///
/// `old_weight` is `0.0` when the edge is absent; `new_weight` is `0.0`
/// for removals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeProposal {
    pub i: usize,
    pub j: usize,
    pub old_weight: f64,
    pub new_weight: f64,
    pub is_create: bool,
    pub is_remove: bool,
}

impl EdgeProposal {
    pub fn create(i: usize, j: usize, weight: f64) -> Self {
        Self { i, j, old_weight: 0.0, new_weight: weight, is_create: true, is_remove: false }
    }

    pub fn remove(i: usize, j: usize, old_weight: f64) -> Self {
        Self { i, j, old_weight, new_weight: 0.0, is_create: false, is_remove: true }
    }

    pub fn reweight(i: usize, j: usize, old_weight: f64, new_weight: f64) -> Self {
        Self { i, j, old_weight, new_weight, is_create: false, is_remove: false }
    }

    pub fn kind(&self) -> MoveKind {
        if self.is_create { MoveKind::Create }
        else if self.is_remove { MoveKind::Remove }
        else { MoveKind::Reweight }
    }

    pub fn delta_weight(&self) -> f64 {
        self.new_weight - self.old_weight
    }

    pub fn key(&self) -> Option<EdgeKey> {
        EdgeKey::new(self.i, self.j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_key_is_canonical() {
        assert_eq!(EdgeKey::new(4, 1), EdgeKey::new(1, 4));
        assert_eq!(EdgeKey::new(3, 3), None);
        let k = EdgeKey::new(7, 2).unwrap();
        assert_eq!(k.other(2), Some(7));
        assert_eq!(k.other(5), None);
    }

    #[test]
    fn test_proposal_kind_and_delta() {
        let p = EdgeProposal::remove(0, 1, 0.25);
        assert_eq!(p.kind(), MoveKind::Remove);
        assert!((p.delta_weight() + 0.25).abs() < 1e-12);
        assert_eq!(EdgeProposal::create(0, 1, 0.5).kind(), MoveKind::Create);
        assert_eq!(EdgeProposal::reweight(0, 1, 0.5, 0.55).kind(), MoveKind::Reweight);
    }
}
