//! # graph-spacetime: Relational Event-Driven Physics Core
//!
//! Spacetime as a dynamic weighted graph. Nodes carry a discrete
//! excitation state and a local proper-time clock; edges carry weights
//! (discrete metric) and gauge phases. There is no global clock tick.
//!
//! ## Design Principles
//!
//! 1. **Causal order first**: one event-time axis, dispatched in
//!    non-decreasing order; nodes in heavy regions tick less often
//! 2. **Every random draw is paid for**: a single [`EnergyLedger`] gates
//!    all stochastic work, and a refused debit changes nothing
//! 3. **Local action**: topology moves are Metropolis-accepted on an
//!    O(deg²) action delta, behind light-cone and gauge-flux vetoes
//! 4. **Colouring, not locks**: node updates fan out over independent sets
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_spacetime::{Graph, Simulation, SimulationConfig, UniformField};
//!
//! # fn example() -> graph_spacetime::Result<()> {
//! let graph = Graph::ring(10, 0.5)?;
//! let mut sim = Simulation::new(SimulationConfig::default(), graph, UniformField::new(10))?;
//!
//! sim.schedule_initial();
//! for _ in 0..100 {
//!     sim.step_event_based_batch(50);
//!     sim.run_topology_cycle();
//! }
//! println!("balance left: {}", sim.ledger().balance());
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | `CausalEventScheduler` | [`scheduler`] | time-ordered event dispatch, lapse |
//! | `NodeStateMachine` | [`state_machine`] | `Rest -> Excited -> Refractory` |
//! | `TopologyMutationEngine` | [`topology`] | Metropolis edge moves, Planck cutoff |
//! | `GaugeSafetyGuard` | [`gauge`] | flux-preserving removal check |
//! | `EnergyLedger` | [`ledger`] | vacuum-energy budget |
//! | `ParallelEventEngine` | [`parallel`] | colour-class sweeps on rayon |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod graph;
pub mod ledger;
pub mod field;
pub mod gauge;
pub mod state_machine;
pub mod scheduler;
pub mod topology;
pub mod parallel;
pub mod simulation;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    NodeId, NodeState, NodeRecord,
    Event, EventKind,
    EdgeKey, EdgeProposal, MoveKind,
};

// ============================================================================
// Re-exports: Engines
// ============================================================================

pub use config::{SimulationConfig, TimeStepMode};
pub use field::{FieldModel, UniformField};
pub use gauge::{EdgePhases, GaugeSafetyGuard, RemovalVerdict};
pub use graph::Graph;
pub use ledger::{EnergyLedger, Entropy, LedgerSnapshot};
pub use parallel::{Coloring, ParallelEventEngine, ParallelStats};
pub use scheduler::{CausalEventScheduler, Measurement, RunSummary, SchedulerStats, StopReason};
pub use simulation::Simulation;
pub use state_machine::{NodeStateMachine, Transition};
pub use topology::{MutationStats, RejectReason, StepOutcome, TopologyMutationEngine};

// ============================================================================
// Error Types
// ============================================================================

/// Construction-time failures. Runtime vetoes are not errors; they come
/// back as [`StepOutcome::Rejected`] or `false`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid node {node} (graph has {count} nodes)")]
    InvalidNode { node: usize, count: usize },

    #[error("Self-loop on node {0}")]
    SelfLoop(usize),

    #[error("Invalid edge weight {0}: must lie in (0, 1]")]
    InvalidWeight(f64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
