//! # Parallel Event Engine
//!
//! Conflict-free node updates by graph colouring. Adjacent nodes never
//! share a colour, so every node in one class reads a neighbourhood that
//! no other node in the class writes.
//!
//! ```text
//!   colour 0 ──► draws (sequential) ──► par_iter advance ──► apply ──► signals
//!   colour 1 ──► draws (sequential) ──► par_iter advance ──► apply ──► signals
//!   ...                                                 (barrier between classes)
//! ```
//!
//! Firing nodes hand their signals to the [`CausalEventScheduler`] once the
//! class is applied, so event-driven and swept runs feed the same queue.
//!
//! The colouring is computed once per `topology_version`. Reweights do not
//! invalidate it; creates and removes do.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ParallelConfig, SchedulerConfig};
use crate::field::FieldModel;
use crate::graph::Graph;
use crate::model::NodeRecord;
use crate::scheduler::{lapse, CausalEventScheduler, EventContext};
use crate::state_machine::{LocalInputs, NodeStateMachine, Transition};

// ============================================================================
// Colouring
// ============================================================================

/// Greedy (Welsh–Powell) proper colouring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coloring {
    colors: Vec<usize>,
    classes: Vec<Vec<usize>>,
    version: u64,
}

impl Coloring {
    /// Visit nodes by descending degree, give each the smallest colour no
    /// coloured neighbour holds.
    pub fn greedy(graph: &Graph) -> Self {
        let n = graph.node_count();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| graph.degree(b).cmp(&graph.degree(a)).then(a.cmp(&b)));

        let mut colors = vec![usize::MAX; n];
        let mut taken: Vec<bool> = Vec::new();
        for &u in &order {
            taken.clear();
            taken.resize(graph.degree(u) + 1, false);
            for &v in graph.neighbors(u) {
                if let Some(slot) = taken.get_mut(colors[v]) {
                    *slot = true;
                }
            }
            colors[u] = taken.iter().position(|t| !t).unwrap_or(taken.len());
        }

        let num_colors = colors.iter().map(|&c| c + 1).max().unwrap_or(0);
        let mut classes = vec![Vec::new(); num_colors];
        for (u, &c) in colors.iter().enumerate() {
            classes[c].push(u);
        }
        Self { colors, classes, version: graph.topology_version() }
    }

    pub fn color(&self, node: usize) -> Option<usize> {
        self.colors.get(node).copied()
    }

    pub fn num_colors(&self) -> usize {
        self.classes.len()
    }

    /// Independent sets, colour order.
    pub fn classes(&self) -> &[Vec<usize>] {
        &self.classes
    }

    /// Topology version this colouring was computed for.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_current(&self, graph: &Graph) -> bool {
        self.version == graph.topology_version() && self.colors.len() == graph.node_count()
    }

    /// No edge joins two nodes of the same colour.
    pub fn is_valid(&self, graph: &Graph) -> bool {
        self.colors.len() == graph.node_count()
            && graph.edges().all(|(k, _)| self.colors[k.lo] != self.colors[k.hi])
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelStats {
    /// Node updates run on rayon workers.
    pub parallel_updates: u64,
    /// Node updates run on the calling thread (small classes).
    pub sequential_updates: u64,
    pub sweeps: u64,
    pub excitations: u64,
    pub firings: u64,
    /// Signals queued on the scheduler by firing nodes.
    pub signals_sent: u64,
}

impl ParallelStats {
    fn merge(&mut self, other: &ParallelStats) {
        self.parallel_updates += other.parallel_updates;
        self.sequential_updates += other.sequential_updates;
        self.sweeps += other.sweeps;
        self.excitations += other.excitations;
        self.firings += other.firings;
        self.signals_sent += other.signals_sent;
    }
}

#[derive(Debug, Clone)]
pub struct ParallelEventEngine {
    config: ParallelConfig,
    scheduler: SchedulerConfig,
    coloring: Option<Coloring>,
    stats: ParallelStats,
}

impl ParallelEventEngine {
    pub fn new(config: ParallelConfig, scheduler: SchedulerConfig) -> Self {
        Self { config, scheduler, coloring: None, stats: ParallelStats::default() }
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn stats(&self) -> &ParallelStats {
        &self.stats
    }

    /// The colouring for the graph's current topology, recomputed if stale.
    pub fn coloring(&mut self, graph: &Graph) -> &Coloring {
        if !self.coloring.as_ref().is_some_and(|c| c.is_current(graph)) {
            let fresh = Coloring::greedy(graph);
            tracing::debug!(colors = fresh.num_colors(), version = fresh.version(), "recoloured graph");
            self.coloring = Some(fresh);
        }
        self.coloring.get_or_insert_with(|| Coloring::greedy(graph))
    }

    /// One synchronous sweep: every colour class in turn, counters updated
    /// immediately.
    pub fn sweep(&mut self, ctx: &mut EventContext<'_>, scheduler: &mut CausalEventScheduler) -> ParallelStats {
        let mut local = ParallelStats::default();
        self.sweep_into(ctx, scheduler, &mut local);
        self.stats.merge(&local);
        local
    }

    /// `sweeps` sweeps with the global counters merged once at the end.
    /// `0` means `config.batch_sweeps`.
    pub fn sweep_batched(
        &mut self,
        ctx: &mut EventContext<'_>,
        scheduler: &mut CausalEventScheduler,
        sweeps: usize,
    ) -> ParallelStats {
        let sweeps = if sweeps == 0 { self.config.batch_sweeps } else { sweeps };
        let mut local = ParallelStats::default();
        for _ in 0..sweeps {
            self.sweep_into(ctx, scheduler, &mut local);
        }
        self.stats.merge(&local);
        local
    }

    fn sweep_into(&mut self, ctx: &mut EventContext<'_>, scheduler: &mut CausalEventScheduler, acc: &mut ParallelStats) {
        let classes = self.coloring(ctx.graph).classes().to_vec();
        let min_batch = self.config.min_parallel_batch;

        for class in &classes {
            // RNG is not shared across workers: draw for the class up front.
            let draws: Vec<Option<f64>> = class
                .iter()
                .map(|&i| match ctx.graph.state(i) {
                    Some(s) if NodeStateMachine::needs_draw(s) => ctx.entropy.try_draw(),
                    _ => None,
                })
                .collect();

            let graph: &Graph = ctx.graph;
            let (field, machine, config) = (ctx.field, ctx.machine, &self.scheduler);
            let updates: Vec<(usize, NodeRecord, Transition)> = if class.len() >= min_batch {
                acc.parallel_updates += class.len() as u64;
                class
                    .par_iter()
                    .zip(draws.par_iter())
                    .filter_map(|(&i, &draw)| advance_node(graph, field, machine, config, i, draw))
                    .collect()
            } else {
                acc.sequential_updates += class.len() as u64;
                class
                    .iter()
                    .zip(&draws)
                    .filter_map(|(&i, &draw)| advance_node(graph, field, machine, config, i, draw))
                    .collect()
            };

            let mut fired: Vec<usize> = Vec::new();
            for (i, record, transition) in updates {
                match transition {
                    Transition::Excited => acc.excitations += 1,
                    Transition::Fired { .. } => {
                        acc.firings += 1;
                        fired.push(i);
                    }
                    _ => {}
                }
                if let Some(slot) = ctx.graph.node_mut(i) {
                    *slot = record;
                }
            }

            // Barrier passed: the class is applied.
            let graph: &Graph = ctx.graph;
            for i in fired {
                for &v in graph.neighbors(i) {
                    if scheduler.propagate_signal(graph, i, v) {
                        acc.signals_sent += 1;
                    }
                }
            }
        }
        acc.sweeps += 1;
    }
}

/// Compute node `i`'s next record from a shared view of the graph.
fn advance_node(
    graph: &Graph,
    field: &dyn FieldModel,
    machine: &NodeStateMachine,
    config: &SchedulerConfig,
    i: usize,
    draw: Option<f64>,
) -> Option<(usize, NodeRecord, Transition)> {
    let mut record = graph.node(i)?.clone();
    let inputs = LocalInputs::gather(graph, field, i);
    let transition = machine.advance(&mut record, &inputs, draw);
    let l = lapse(config, inputs.mass, inputs.curvature);
    record.time_dilation = l;
    record.proper_time += config.base_step * l;
    Some((i, record, transition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::UniformField;
    use crate::ledger::{EnergyLedger, Entropy};
    use crate::model::{EventKind, NodeState};

    #[test]
    fn test_ring_coloring_is_valid() {
        let even = Graph::ring(10, 0.5).unwrap();
        let c = Coloring::greedy(&even);
        assert!(c.is_valid(&even));
        assert_eq!(c.num_colors(), 2);

        let odd = Graph::ring(7, 0.5).unwrap();
        let c = Coloring::greedy(&odd);
        assert!(c.is_valid(&odd));
        assert_eq!(c.num_colors(), 3);
    }

    #[test]
    fn test_classes_partition_nodes() {
        let g = Graph::random(50, 0.2, 0.5, 9).unwrap();
        let c = Coloring::greedy(&g);
        assert!(c.is_valid(&g));
        let mut all: Vec<usize> = c.classes().iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        assert!(c.num_colors() <= g.degrees().iter().max().copied().unwrap_or(0) + 1);
    }

    #[test]
    fn test_empty_graph() {
        let g = Graph::new(0);
        let c = Coloring::greedy(&g);
        assert_eq!(c.num_colors(), 0);
        assert!(c.is_valid(&g));
    }

    #[test]
    fn test_coloring_cached_by_version() {
        let mut g = Graph::ring(6, 0.5).unwrap();
        let mut engine = ParallelEventEngine::new(ParallelConfig::default(), SchedulerConfig::default());
        let v0 = engine.coloring(&g).version();
        g.set_weight(0, 1, 0.9);
        assert_eq!(engine.coloring(&g).version(), v0);
        g.insert_edge(0, 3, 0.5);
        let fresh = engine.coloring(&g);
        assert_ne!(fresh.version(), v0);
        assert!(fresh.is_valid(&g));
    }

    fn run_sweeps(n: usize, min_parallel_batch: usize) -> (ParallelStats, Graph) {
        let (stats, graph, _) = run_sweeps_with_scheduler(n, min_parallel_batch);
        (stats, graph)
    }

    fn run_sweeps_with_scheduler(n: usize, min_parallel_batch: usize) -> (ParallelStats, Graph, CausalEventScheduler) {
        let mut graph = Graph::ring(n, 0.5).unwrap();
        let field = UniformField::new(n).with_curvature(vec![5.0; n]);
        let mut entropy = Entropy::new(5, EnergyLedger::new(1e6), 0.001);
        let machine = NodeStateMachine::default();
        let mut engine = ParallelEventEngine::new(
            ParallelConfig { min_parallel_batch, ..Default::default() },
            SchedulerConfig::default(),
        );
        let mut scheduler = CausalEventScheduler::new(SchedulerConfig::default(), n);
        let mut ctx = EventContext { graph: &mut graph, field: &field, entropy: &mut entropy, machine: &machine };
        engine.sweep(&mut ctx, &mut scheduler);
        engine.sweep_batched(&mut ctx, &mut scheduler, 3);
        (*engine.stats(), graph, scheduler)
    }

    #[test]
    fn test_counters_split_by_batch_size() {
        let (par, _) = run_sweeps(200, 10);
        assert_eq!(par.sweeps, 4);
        assert_eq!(par.parallel_updates, 800);
        assert_eq!(par.sequential_updates, 0);

        let (seq, _) = run_sweeps(20, 64);
        assert_eq!(seq.parallel_updates, 0);
        assert_eq!(seq.sequential_updates, 80);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (a, ga) = run_sweeps(200, 1);
        let (b, gb) = run_sweeps(200, usize::MAX);
        assert_eq!(a.excitations, b.excitations);
        assert_eq!(a.firings, b.firings);
        assert_eq!(ga.nodes(), gb.nodes());
    }

    #[test]
    fn test_sweep_advances_proper_time() {
        let (stats, g) = run_sweeps(20, 64);
        for rec in g.nodes() {
            // Four sweeps at base_step 0.01 under lapse 1/(1 + 0.5·5).
            assert!((rec.proper_time - 4.0 * 0.01 / 3.5).abs() < 1e-12);
            assert!((rec.time_dilation - 1.0 / 3.5).abs() < 1e-12);
        }
        // Curvature 5 saturates the spontaneous rate at 0.5.
        assert!(stats.excitations > 0);
        assert!(g.nodes().iter().any(|r| r.state != NodeState::Rest));
    }

    #[test]
    fn test_firings_signal_neighbours() {
        let (stats, _, mut scheduler) = run_sweeps_with_scheduler(20, 64);
        assert!(stats.firings > 0);
        // Every ring node has two neighbours, all reachable.
        assert_eq!(stats.signals_sent, 2 * stats.firings);
        assert_eq!(scheduler.stats().signals_sent, stats.signals_sent);
        assert_eq!(scheduler.pending() as u64, stats.signals_sent);
        let mut graph = Graph::ring(20, 0.5).unwrap();
        let field = UniformField::new(20);
        let mut entropy = Entropy::new(5, EnergyLedger::new(1e6), 0.001);
        let machine = NodeStateMachine::default();
        let mut ctx = EventContext { graph: &mut graph, field: &field, entropy: &mut entropy, machine: &machine };
        let event = scheduler.step(&mut ctx).unwrap();
        assert!(matches!(event.kind, EventKind::Signal { .. }));
    }
}
