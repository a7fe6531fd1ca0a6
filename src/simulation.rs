//! # Simulation Driver
//!
//! Owns the graph and every engine, and wires the feedback loop:
//!
//! ```text
//!   CausalEventScheduler ──pop──► NodeStateMachine
//!            ▲                          │
//!            │ reschedule endpoints     │ (separately driven)
//!            │                          ▼
//!   TopologyMutationEngine ──► GaugeSafetyGuard, EnergyLedger
//! ```
//!
//! This is the surface field modules and front ends talk to. Everything
//! stochastic pays into one [`EnergyLedger`], reachable via [`Simulation::ledger`]
//! so collaborators can draw from the same pool.

use crate::config::SimulationConfig;
use crate::field::{FieldModel, UniformField};
use crate::gauge::EdgePhases;
use crate::graph::Graph;
use crate::ledger::{EnergyLedger, Entropy};
use crate::model::{EdgeProposal, Event, EventKind};
use crate::parallel::{ParallelEventEngine, ParallelStats};
use crate::scheduler::{CausalEventScheduler, EventContext, Measurement, RunSummary};
use crate::state_machine::NodeStateMachine;
use crate::topology::{CutoffReport, CycleReport, MutationContext, StepOutcome, TopologyMutationEngine};
use crate::Result;

pub struct Simulation<F: FieldModel = UniformField> {
    config: SimulationConfig,
    graph: Graph,
    phases: EdgePhases,
    field: F,
    ledger: EnergyLedger,
    entropy: Entropy,
    scheduler: CausalEventScheduler,
    machine: NodeStateMachine,
    topology: TopologyMutationEngine,
    parallel: ParallelEventEngine,
}

impl<F: FieldModel> Simulation<F> {
    /// Validate `config` and assemble the engines around `graph`.
    pub fn new(config: SimulationConfig, graph: Graph, field: F) -> Result<Self> {
        config.validate()?;
        let ledger = EnergyLedger::new(config.ledger.initial_balance);
        let entropy = Entropy::new(config.seed, ledger.clone(), config.ledger.rng_draw_cost);
        let scheduler = CausalEventScheduler::new(config.scheduler.clone(), graph.node_count());
        let machine = NodeStateMachine::new(config.node.clone());
        let topology = TopologyMutationEngine::new(
            config.topology.clone(),
            config.gauge.clone(),
            config.ledger.edge_creation_cost,
        )?;
        let parallel = ParallelEventEngine::new(config.parallel.clone(), config.scheduler.clone());
        tracing::debug!(nodes = graph.node_count(), edges = graph.edge_count(), "simulation assembled");

        Ok(Self {
            config,
            graph,
            phases: EdgePhases::new(),
            field,
            ledger,
            entropy,
            scheduler,
            machine,
            topology,
            parallel,
        })
    }

    /// Start from existing gauge links.
    pub fn with_phases(mut self, phases: EdgePhases) -> Self {
        self.phases = phases;
        self
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Enqueue an `Update` for every node at the current time.
    pub fn schedule_initial(&mut self) {
        self.scheduler.schedule_initial(&mut self.graph);
    }

    pub fn schedule_measurement(&mut self, node: usize, time: f64) -> bool {
        self.scheduler.schedule(node, time, EventKind::Measurement)
    }

    /// Dispatch the earliest pending event.
    pub fn step_event_based(&mut self) -> Option<Event> {
        let mut ctx = EventContext {
            graph: &mut self.graph,
            field: &self.field,
            entropy: &mut self.entropy,
            machine: &self.machine,
        };
        self.scheduler.step(&mut ctx)
    }

    /// Dispatch up to `n` events; returns how many ran.
    pub fn step_event_based_batch(&mut self, n: usize) -> usize {
        self.run_relational_loop(n).dispatched
    }

    /// Run until `duration` of coordinate time has elapsed or `max_events`
    /// have been dispatched.
    pub fn run(&mut self, duration: f64, max_events: usize) -> RunSummary {
        let mut ctx = EventContext {
            graph: &mut self.graph,
            field: &self.field,
            entropy: &mut self.entropy,
            machine: &self.machine,
        };
        self.scheduler.run(&mut ctx, duration, max_events)
    }

    pub fn run_relational_loop(&mut self, max_events: usize) -> RunSummary {
        let mut ctx = EventContext {
            graph: &mut self.graph,
            field: &self.field,
            entropy: &mut self.entropy,
            machine: &self.machine,
        };
        self.scheduler.run_relational_loop(&mut ctx, max_events)
    }

    pub fn drain_measurements(&mut self) -> Vec<Measurement> {
        self.scheduler.drain_measurements()
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// One Metropolis attempt. A committed create/remove restarts both
    /// endpoints' update chains under their new lapse.
    pub fn propose_topology_step(&mut self) -> StepOutcome {
        let mut ctx = MutationContext {
            graph: &mut self.graph,
            phases: &mut self.phases,
            field: &self.field,
            entropy: &mut self.entropy,
        };
        let outcome = self.topology.propose_step(&mut ctx);
        self.after_mutation(outcome);
        outcome
    }

    /// Route an externally built proposal through the same checks.
    pub fn resolve_proposal(&mut self, proposal: EdgeProposal, accept_u: f64) -> StepOutcome {
        let mut ctx = MutationContext {
            graph: &mut self.graph,
            phases: &mut self.phases,
            field: &self.field,
            entropy: &mut self.entropy,
        };
        let outcome = self.topology.resolve(&mut ctx, proposal, accept_u);
        self.after_mutation(outcome);
        outcome
    }

    /// `max(10, N/10)` Metropolis attempts.
    pub fn run_topology_cycle(&mut self) -> CycleReport {
        let mut ctx = MutationContext {
            graph: &mut self.graph,
            phases: &mut self.phases,
            field: &self.field,
            entropy: &mut self.entropy,
        };
        let scheduler = &mut self.scheduler;
        let report = self.topology.run_cycle(&mut ctx, |graph, field, edge| {
            for node in [edge.lo, edge.hi] {
                scheduler.reschedule_update(graph, field, node);
            }
        });
        tracing::info!(
            attempts = report.attempts,
            accepted = report.accepted,
            structural = report.structural,
            edges = self.graph.edge_count(),
            balance = self.ledger.balance(),
            "topology cycle"
        );
        report
    }

    pub fn planck_cutoff(&mut self) -> CutoffReport {
        let mut ctx = MutationContext {
            graph: &mut self.graph,
            phases: &mut self.phases,
            field: &self.field,
            entropy: &mut self.entropy,
        };
        let report = self.topology.planck_cutoff(&mut ctx);
        for edge in &report.removed_edges {
            for node in [edge.lo, edge.hi] {
                self.scheduler.reschedule_update(&mut self.graph, &self.field, node);
            }
        }
        report
    }

    fn after_mutation(&mut self, outcome: StepOutcome) {
        if !outcome.is_structural() {
            return;
        }
        if let Some(edge) = self.topology.last_structural() {
            for node in [edge.lo, edge.hi] {
                self.scheduler.reschedule_update(&mut self.graph, &self.field, node);
            }
        }
    }

    // ========================================================================
    // Safety predicates
    // ========================================================================

    pub fn is_causally_allowed(&self, i: usize, j: usize) -> bool {
        self.topology.is_causally_allowed(&self.graph, i, j)
    }

    pub fn can_remove_edge_gauge_invariant(&self, i: usize, j: usize) -> bool {
        self.topology.guard().is_removal_safe(&self.graph, &self.phases, i, j)
    }

    // ========================================================================
    // Parallel sweeps
    // ========================================================================

    pub fn parallel_sweep(&mut self) -> ParallelStats {
        let mut ctx = EventContext {
            graph: &mut self.graph,
            field: &self.field,
            entropy: &mut self.entropy,
            machine: &self.machine,
        };
        self.parallel.sweep(&mut ctx, &mut self.scheduler)
    }

    /// `sweeps == 0` uses the configured batch size.
    pub fn parallel_sweep_batched(&mut self, sweeps: usize) -> ParallelStats {
        let mut ctx = EventContext {
            graph: &mut self.graph,
            field: &self.field,
            entropy: &mut self.entropy,
            machine: &self.machine,
        };
        self.parallel.sweep_batched(&mut ctx, &mut self.scheduler, sweeps)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn phases(&self) -> &EdgePhases {
        &self.phases
    }

    /// The gauge-field module evolves the links in place.
    pub fn phases_mut(&mut self) -> &mut EdgePhases {
        &mut self.phases
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut F {
        &mut self.field
    }

    /// Shared handle; clones debit the same pool.
    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    pub fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    pub fn scheduler(&self) -> &CausalEventScheduler {
        &self.scheduler
    }

    pub fn topology(&self) -> &TopologyMutationEngine {
        &self.topology
    }

    pub fn parallel_stats(&self) -> &ParallelStats {
        self.parallel.stats()
    }

    pub fn current_time(&self) -> f64 {
        self.scheduler.current_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::model::MoveKind;
    use crate::topology::RejectReason;
    use crate::Error;

    fn ring_sim(n: usize) -> Simulation {
        Simulation::new(SimulationConfig::default(), Graph::ring(n, 0.5).unwrap(), UniformField::new(n)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = SimulationConfig::default();
        config.topology.temperature = 0.0;
        let result = Simulation::new(config, Graph::new(3), UniformField::new(3));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_event_loop_runs() {
        let mut sim = ring_sim(8);
        sim.schedule_initial();
        assert_eq!(sim.scheduler().pending(), 8);
        assert_eq!(sim.step_event_based_batch(50), 50);
        assert!(sim.current_time() > 0.0);
        assert!(sim.ledger().balance() >= 0.0);
    }

    #[test]
    fn test_structural_commit_reschedules_endpoints() {
        let mut config = SimulationConfig::default();
        config.topology = TopologyConfig { chirality_penalty: 0.0, ..TopologyConfig::default() };
        let mut sim = Simulation::new(config, Graph::ring(10, 0.5).unwrap(), UniformField::new(10)).unwrap();
        sim.schedule_initial();
        let before = sim.scheduler().pending();

        let out = sim.resolve_proposal(EdgeProposal::create(0, 2, 0.1), 0.0);
        assert_eq!(out, StepOutcome::Accepted(MoveKind::Create));
        assert_eq!(sim.scheduler().pending(), before + 2);
        assert!(sim.phases().phase(0, 2).abs() < 1e-12);
    }

    #[test]
    fn test_planck_cutoff_reschedules_endpoints() {
        let graph = Graph::from_edges(4, &[(0, 1, 0.05), (1, 2, 0.5), (2, 3, 0.05)]).unwrap();
        let mut sim = Simulation::new(SimulationConfig::default(), graph, UniformField::new(4)).unwrap();
        sim.schedule_initial();
        let before = sim.scheduler().pending();

        let report = sim.planck_cutoff();
        assert_eq!(report.removed, 2);
        assert_eq!(sim.scheduler().pending(), before + 4);
        assert!(sim.scheduler().stats().scheduled >= before as u64 + 4);
    }

    #[test]
    fn test_safety_predicates() {
        let sim = ring_sim(10);
        assert!(sim.is_causally_allowed(0, 2));
        assert!(!sim.is_causally_allowed(0, 5));
        assert!(!sim.is_causally_allowed(3, 3));
        assert!(sim.can_remove_edge_gauge_invariant(0, 1));
        assert!(!sim.can_remove_edge_gauge_invariant(0, 5));
    }

    #[test]
    fn test_causality_rejection_leaves_schedule_alone() {
        let mut sim = ring_sim(10);
        sim.schedule_initial();
        let out = sim.resolve_proposal(EdgeProposal::create(0, 5, 0.1), 0.0);
        assert_eq!(out, StepOutcome::Rejected(RejectReason::Causality));
        assert_eq!(sim.scheduler().pending(), 10);
    }

    #[test]
    fn test_topology_cycle_and_sweeps() {
        let mut sim = ring_sim(30);
        let report = sim.run_topology_cycle();
        assert_eq!(report.attempts, 10);
        assert_eq!(sim.topology().stats().attempts, 10);

        let stats = sim.parallel_sweep_batched(0);
        assert_eq!(stats.sweeps, 4);
        assert_eq!(sim.parallel_stats().sweeps, 4);
        assert!(sim.ledger().balance() >= 0.0);
    }

    #[test]
    fn test_measurements_are_logged() {
        let mut sim = ring_sim(4);
        assert!(sim.schedule_measurement(2, 0.5));
        assert!(!sim.schedule_measurement(9, 0.5));
        sim.run_relational_loop(10);
        let log = sim.drain_measurements();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].node.index(), 2);
    }
}
