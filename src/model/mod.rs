//! # Graph Spacetime Model
//!
//! Plain records shared by every engine: node identity and state, scheduler
//! events, edge keys and Metropolis proposals.
//!
//! Design rule: this module is pure data. No RNG, no ledger, no locks.

pub mod node;
pub mod event;
pub mod proposal;

pub use node::{NodeId, NodeRecord, NodeState};
pub use event::{Event, EventKind};
pub use proposal::{EdgeKey, EdgeProposal, MoveKind};
