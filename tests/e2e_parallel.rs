//! End-to-end: colour-class sweeps over an evolving topology.

use pretty_assertions::assert_eq;

use graph_spacetime::{
    Coloring, Graph, ParallelEventEngine, Simulation, SimulationConfig, UniformField,
};
use graph_spacetime::config::{ParallelConfig, SchedulerConfig};

fn busy_sim(n: usize, min_parallel_batch: usize) -> Simulation {
    let mut config = SimulationConfig::default();
    config.parallel.min_parallel_batch = min_parallel_batch;
    config.topology.chirality_penalty = 0.0;
    config.topology.temperature = 20.0;
    let field = UniformField::new(n).with_curvature(vec![2.0; n]);
    Simulation::new(config, Graph::random(n, 0.05, 0.5, 23).unwrap(), field).unwrap()
}

// ============================================================================
// 1. Colouring stays proper as the topology changes
// ============================================================================

#[test]
fn test_coloring_tracks_topology_version() {
    let mut sim = busy_sim(120, 16);
    let mut engine = ParallelEventEngine::new(ParallelConfig::default(), SchedulerConfig::default());

    for _ in 0..20 {
        sim.run_topology_cycle();
        let graph = sim.graph();
        let coloring = engine.coloring(graph);
        assert!(coloring.is_valid(graph));
        assert_eq!(coloring.version(), graph.topology_version());
    }
    assert!(sim.topology().stats().created + sim.topology().stats().removed > 0);
}

// ============================================================================
// 2. Large classes go parallel, small ones sequential
// ============================================================================

#[test]
fn test_sweep_counters() {
    let mut sim = busy_sim(300, 32);
    let coloring = Coloring::greedy(sim.graph());
    let (big, small): (Vec<usize>, Vec<usize>) =
        coloring.classes().iter().map(Vec::len).partition(|&len| len >= 32);

    let stats = sim.parallel_sweep();
    assert_eq!(stats.sweeps, 1);
    assert_eq!(stats.parallel_updates, big.iter().sum::<usize>() as u64);
    assert_eq!(stats.sequential_updates, small.iter().sum::<usize>() as u64);
    assert_eq!(stats.parallel_updates + stats.sequential_updates, 300);
}

// ============================================================================
// 3. Batched mode merges counters once, with the same totals
// ============================================================================

#[test]
fn test_batched_sweeps_match_synchronous() {
    let mut a = busy_sim(200, 8);
    let mut b = busy_sim(200, 8);

    for _ in 0..4 {
        a.parallel_sweep();
    }
    let batch = b.parallel_sweep_batched(4);

    assert_eq!(*a.parallel_stats(), batch);
    assert_eq!(a.graph().nodes(), b.graph().nodes());
    assert_eq!(a.entropy().draws(), b.entropy().draws());
}

// ============================================================================
// 4. Thread count does not change the outcome
// ============================================================================

#[test]
fn test_parallel_result_is_deterministic() {
    let run = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        pool.install(|| {
            let mut sim = busy_sim(250, 4);
            sim.parallel_sweep_batched(5);
            sim.graph().nodes().to_vec()
        })
    };
    assert_eq!(run(1), run(4));
}

// ============================================================================
// 5. Swept firings feed the event queue
// ============================================================================

#[test]
fn test_swept_firings_reach_neighbours() {
    let n = 20;
    let field = UniformField::new(n).with_curvature(vec![5.0; n]);
    let mut sim = Simulation::new(SimulationConfig::default(), Graph::ring(n, 0.5).unwrap(), field).unwrap();

    let stats = sim.parallel_sweep_batched(6);
    assert!(stats.firings > 0);
    assert_eq!(stats.signals_sent, 2 * stats.firings);
    assert_eq!(sim.scheduler().stats().signals_sent, stats.signals_sent);
    assert_eq!(sim.scheduler().pending() as u64, stats.signals_sent);

    sim.run_relational_loop(stats.signals_sent as usize);
    assert!(sim.scheduler().stats().signals_received >= stats.signals_sent);
}
