//! Scheduler events.

use serde::{Deserialize, Serialize};
use super::NodeId;

/// What an event asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Regular proper-time tick of the node's state machine.
    Update,
    /// A causal signal emitted by `source` has arrived.
    Signal { source: NodeId },
    /// Record the node's state without changing it.
    Measurement,
}

/// Immutable event record. Consumed exactly once when dequeued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    pub node: NodeId,
    pub kind: EventKind,
}

