//! Local action delta for one edge proposal.
//!
//! Only `i`, `j` and their immediate neighbours are read, so evaluating a
//! proposal costs O(deg²) regardless of graph size.
//!
//! | Term | Form |
//! |------|------|
//! | geometry | `−(1/G) Σ F(e)` over edges touching `i` or `j` (Forman–Ricci) |
//! | matter | `−κ_m · ⟨T_ij⟩_EMA · Δw` |
//! | volume | `λ · (W − W*) · Δw` |
//! | field | `κ_φ · Δw · (φ_i − φ_j)²` |
//! | chirality | `penalty · Δw` when `i`, `j` share parity |

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::TopologyConfig;
use crate::field::{finite_or_zero, FieldModel};
use crate::graph::Graph;
use crate::model::{EdgeKey, EdgeProposal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ActionDelta {
    pub geometry: f64,
    pub matter: f64,
    pub volume: f64,
    pub field: f64,
    pub chirality: f64,
}

impl ActionDelta {
    pub fn total(&self) -> f64 {
        self.geometry + self.matter + self.volume + self.field + self.chirality
    }
}

/// The graph as it would look with one edge's weight replaced.
/// `None` weight means the edge is absent.
#[derive(Clone, Copy)]
struct Overlay<'a> {
    graph: &'a Graph,
    key: EdgeKey,
    weight: Option<f64>,
}

impl Overlay<'_> {
    fn weight(&self, a: usize, b: usize) -> Option<f64> {
        match EdgeKey::new(a, b) {
            Some(k) if k == self.key => self.weight,
            _ => self.graph.weight(a, b),
        }
    }

    fn neighbors(&self, u: usize) -> SmallVec<[usize; 8]> {
        let mut out: SmallVec<[usize; 8]> = self
            .graph
            .neighbors(u)
            .iter()
            .copied()
            .filter(|&v| self.weight(u, v).is_some())
            .collect();
        if let (Some(other), Some(_)) = (self.key.other(u), self.weight) {
            if !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    /// Forman–Ricci curvature of edge `a-b` with unit node weights:
    /// `2 − Σ_{c~a, c≠b} √(w_ab / w_ac) − Σ_{c~b, c≠a} √(w_ab / w_bc)`.
    fn forman(&self, a: usize, b: usize) -> f64 {
        let Some(w) = self.weight(a, b) else { return 0.0 };
        let side = |u: usize, skip: usize| -> f64 {
            self.neighbors(u)
                .iter()
                .filter(|&&c| c != skip)
                .filter_map(|&c| self.weight(u, c))
                .map(|wc| (w / wc).sqrt())
                .sum()
        };
        2.0 - side(a, b) - side(b, a)
    }

    /// `Σ F(e)` over every edge touching `i` or `j`.
    fn local_curvature_sum(&self, i: usize, j: usize) -> f64 {
        let mut total = 0.0;
        for &v in &self.neighbors(i) {
            total += self.forman(i, v);
        }
        for &v in &self.neighbors(j) {
            if v != i {
                total += self.forman(j, v);
            }
        }
        total
    }
}

/// Evaluate `ΔS` for `proposal`. `matter_estimate` is the smoothed
/// stress-energy on the edge. The graph's parity cache must be fresh.
pub(crate) fn local_action_delta(
    graph: &Graph,
    field: &dyn FieldModel,
    config: &TopologyConfig,
    proposal: &EdgeProposal,
    matter_estimate: f64,
) -> ActionDelta {
    let Some(key) = proposal.key() else { return ActionDelta::default() };
    let (i, j) = (proposal.i, proposal.j);
    let dw = proposal.delta_weight();

    let before = Overlay { graph, key, weight: (!proposal.is_create).then_some(proposal.old_weight) };
    let after = Overlay { graph, key, weight: (!proposal.is_remove).then_some(proposal.new_weight) };
    let geometry = -(after.local_curvature_sum(i, j) - before.local_curvature_sum(i, j))
        / config.gravitational_coupling;

    let matter = -config.matter_coupling * matter_estimate * dw;
    let volume = config.volume_coupling * (graph.total_weight() - config.target_total_weight) * dw;

    let gradient = finite_or_zero(field.scalar(i)) - finite_or_zero(field.scalar(j));
    let field_term = config.field_coupling * dw * gradient * gradient;

    let chirality = if graph.same_parity(i, j) { config.chirality_penalty * dw } else { 0.0 };

    ActionDelta { geometry, matter, volume, field: field_term, chirality }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::UniformField;

    fn quiet_config() -> TopologyConfig {
        TopologyConfig {
            matter_coupling: 0.0,
            volume_coupling: 0.0,
            field_coupling: 0.0,
            chirality_penalty: 0.0,
            ..TopologyConfig::default()
        }
    }

    #[test]
    fn test_uniform_ring_edge_is_flat() {
        let g = Graph::ring(6, 0.5).unwrap();
        let ov = Overlay { graph: &g, key: EdgeKey::new(0, 1).unwrap(), weight: Some(0.5) };
        assert!(ov.forman(0, 1).abs() < 1e-12);
    }

    #[test]
    fn test_overlay_hides_removed_edge() {
        let g = Graph::ring(4, 0.5).unwrap();
        let ov = Overlay { graph: &g, key: EdgeKey::new(0, 1).unwrap(), weight: None };
        assert_eq!(ov.neighbors(0).as_slice(), &[3]);
        let ov = Overlay { graph: &g, key: EdgeKey::new(0, 2).unwrap(), weight: Some(0.3) };
        assert_eq!(ov.neighbors(0).len(), 3);
    }

    #[test]
    fn test_volume_term_pulls_towards_target() {
        let mut g = Graph::ring(10, 0.5).unwrap();
        g.refresh_caches();
        let config = TopologyConfig { volume_coupling: 1.0, ..quiet_config() };
        let field = UniformField::new(10);
        let grow = EdgeProposal::reweight(0, 1, 0.5, 0.6);
        let shrink = EdgeProposal::reweight(0, 1, 0.5, 0.4);
        // Total weight 5 is below the target of 10.
        assert!(local_action_delta(&g, &field, &config, &grow, 0.0).volume < 0.0);
        assert!(local_action_delta(&g, &field, &config, &shrink, 0.0).volume > 0.0);
    }

    #[test]
    fn test_chirality_only_for_same_parity() {
        let mut g = Graph::ring(6, 0.5).unwrap();
        g.refresh_caches();
        let config = TopologyConfig { chirality_penalty: 2.0, ..quiet_config() };
        let field = UniformField::new(6);
        let same = EdgeProposal::create(0, 2, 0.5);
        let mixed = EdgeProposal::create(0, 3, 0.5);
        assert!((local_action_delta(&g, &field, &config, &same, 0.0).chirality - 1.0).abs() < 1e-12);
        assert_eq!(local_action_delta(&g, &field, &config, &mixed, 0.0).chirality, 0.0);
    }

    #[test]
    fn test_field_gradient_costs_weight() {
        let mut g = Graph::ring(4, 0.5).unwrap();
        g.refresh_caches();
        let config = TopologyConfig { field_coupling: 1.0, ..quiet_config() };
        let field = UniformField::new(4).with_scalar(vec![1.0, 0.0, 0.0, 0.0]);
        let d = local_action_delta(&g, &field, &config, &EdgeProposal::reweight(0, 1, 0.5, 0.7), 0.0);
        assert!((d.field - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_matter_attracts_weight() {
        let mut g = Graph::ring(4, 0.5).unwrap();
        g.refresh_caches();
        let config = TopologyConfig { matter_coupling: 1.0, ..quiet_config() };
        let field = UniformField::new(4);
        let d = local_action_delta(&g, &field, &config, &EdgeProposal::reweight(0, 1, 0.5, 0.6), 2.0);
        assert!(d.matter < 0.0);
    }

    #[test]
    fn test_geometry_is_local_and_finite() {
        let mut g = Graph::random(40, 0.15, 0.5, 11).unwrap();
        g.refresh_caches();
        let field = UniformField::new(40);
        let config = TopologyConfig::default();
        for (k, w) in g.edges().take(10) {
            let d = local_action_delta(&g, &field, &config, &EdgeProposal::remove(k.lo, k.hi, w), 0.0);
            assert!(d.total().is_finite());
        }
    }
}
