//! Planck cutoff: prune edges that have decayed to the weight floor.
//!
//! The scan is read-only and runs on rayon. Commits are sequential and
//! re-check the gauge verdict, since an earlier removal in the same pass
//! can turn a later candidate into a bridge.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{MutationContext, TopologyMutationEngine};
use crate::model::EdgeKey;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffReport {
    /// Edges at or below the floor.
    pub candidates: usize,
    pub removed: usize,
    /// Candidates kept because removal would destroy flux.
    pub vetoed: usize,
    /// Pruned edges in commit order.
    pub removed_edges: Vec<EdgeKey>,
}

impl TopologyMutationEngine {
    pub fn planck_cutoff(&mut self, ctx: &mut MutationContext<'_>) -> CutoffReport {
        let floor = self.config.min_weight + self.config.cutoff_margin;
        let graph = &*ctx.graph;
        let phases = &*ctx.phases;
        let guard = &self.guard;

        let mut candidates: Vec<(EdgeKey, bool)> = graph
            .edges()
            .filter(|&(_, w)| w <= floor)
            .map(|(k, _)| k)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|k| (k, guard.assess_removal(graph, phases, k.lo, k.hi).is_safe()))
            .collect();
        candidates.sort_unstable_by_key(|&(k, _)| k);

        let mut report = CutoffReport { candidates: candidates.len(), ..Default::default() };
        for (key, presumed_safe) in candidates {
            if !presumed_safe {
                report.vetoed += 1;
                continue;
            }
            let verdict = self.guard.assess_removal(ctx.graph, ctx.phases, key.lo, key.hi);
            if !verdict.is_safe() {
                report.vetoed += 1;
                continue;
            }
            self.commit_removal(ctx, key, verdict);
            report.removed += 1;
            report.removed_edges.push(key);
        }

        self.stats.cutoff_removed += report.removed as u64;
        if report.candidates > 0 {
            tracing::info!(
                candidates = report.candidates,
                removed = report.removed,
                vetoed = report.vetoed,
                "planck cutoff"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GaugeConfig, TopologyConfig};
    use crate::field::UniformField;
    use crate::gauge::EdgePhases;
    use crate::graph::Graph;
    use crate::ledger::{EnergyLedger, Entropy};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_prunes_floor_edges_and_refunds() {
        let mut graph = Graph::from_edges(4, &[(0, 1, 0.05), (1, 2, 0.5), (2, 3, 0.05)]).unwrap();
        let mut phases = EdgePhases::new();
        let field = UniformField::new(4);
        let mut entropy = Entropy::new(1, EnergyLedger::new(1.0), 0.001);
        let mut engine = TopologyMutationEngine::new(TopologyConfig::default(), GaugeConfig::default(), 0.05).unwrap();

        let report = engine.planck_cutoff(&mut MutationContext {
            graph: &mut graph,
            phases: &mut phases,
            field: &field,
            entropy: &mut entropy,
        });
        let removed_edges = vec![EdgeKey::new(0, 1).unwrap(), EdgeKey::new(2, 3).unwrap()];
        assert_eq!(report, CutoffReport { candidates: 2, removed: 2, vetoed: 0, removed_edges });
        assert_eq!(graph.edge_count(), 1);
        assert!((entropy.ledger().balance() - 1.1).abs() < 1e-9);
        assert_eq!(engine.stats().cutoff_removed, 2);
    }

    #[test]
    fn test_flux_bridge_survives_cutoff() {
        let mut graph = Graph::from_edges(3, &[(0, 1, 0.05), (1, 2, 0.5), (2, 0, 0.5)]).unwrap();
        let mut phases = EdgePhases::new();
        phases.set(0, 1, FRAC_PI_2);
        let field = UniformField::new(3);
        let mut entropy = Entropy::new(1, EnergyLedger::new(1.0), 0.001);
        let mut engine = TopologyMutationEngine::new(TopologyConfig::default(), GaugeConfig::default(), 0.05).unwrap();

        let report = engine.planck_cutoff(&mut MutationContext {
            graph: &mut graph,
            phases: &mut phases,
            field: &field,
            entropy: &mut entropy,
        });
        assert_eq!(report.vetoed, 1);
        assert!(graph.has_edge(0, 1));
    }
}
