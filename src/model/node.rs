//! Node in the graph spacetime.

use serde::{Deserialize, Serialize};

/// Dense node index (`0..N-1`). Nodes are never destroyed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(i: usize) -> Self {
        NodeId(i)
    }
}

/// Discrete excitation state. Cycles `Rest -> Excited -> Refractory -> Rest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Rest,
    Excited,
    Refractory,
}

/// Per-node mutable record. Only the owning node's update writes these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub state: NodeState,
    /// Updates left before a refractory node returns to rest.
    pub refractory_counter: u32,
    /// Local clock.
    pub proper_time: f64,
    /// Coordinate time of the next scheduled `Update`.
    pub next_update_time: f64,
    /// Lapse in `(0, 1]`; `1.0` is flat space.
    pub time_dilation: f64,
}

impl Default for NodeRecord {
    fn default() -> Self {
        Self {
            state: NodeState::Rest,
            refractory_counter: 0,
            proper_time: 0.0,
            next_update_time: 0.0,
            time_dilation: 1.0,
        }
    }
}

impl NodeRecord {
    pub fn is_excited(&self) -> bool {
        self.state == NodeState::Excited
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }
}
