//! # Field Collaborators
//!
//! The core never evolves scalar/spinor/gauge fields itself. It reads them
//! through `FieldModel`, a set of opaque numeric callbacks supplied by the
//! field modules. Every read goes through [`finite_or_zero`] so a corrupted
//! amplitude degrades to zero instead of poisoning the action or the clock.

use hashbrown::HashMap;

use crate::graph::Graph;
use crate::model::EdgeKey;

/// Read-only numeric callbacks consumed by the core.
///
/// Implementations must be `Sync`: colour-class sweeps read them from
/// rayon workers.
pub trait FieldModel: Send + Sync {
    /// Local curvature at `node`.
    fn local_curvature(&self, graph: &Graph, node: usize) -> f64;

    /// Stress-energy flowing along `i-j`.
    fn stress_energy(&self, _i: usize, _j: usize) -> f64 {
        0.0
    }

    /// Scalar field amplitude at `node`.
    fn scalar(&self, _node: usize) -> f64 {
        0.0
    }

    /// Local mass density at `node`.
    fn mass(&self, _node: usize) -> f64 {
        0.0
    }

    /// Mean mass over the graph; normalises refractory duration.
    fn average_mass(&self) -> f64 {
        1.0
    }

    /// External potential at `node`.
    fn potential(&self, _node: usize) -> f64 {
        0.0
    }

    /// Field energy stored on edge `i-j`, released when the edge goes.
    fn edge_energy(&self, _i: usize, _j: usize) -> f64 {
        0.0
    }
}

/// Replace NaN/Inf with zero.
pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        tracing::warn!(value = x, "non-finite field value zeroed");
        0.0
    }
}

/// Table-backed field model.
///
/// Curvature defaults to the mean unweighted Forman curvature of the
/// incident edges (`4 - deg(u) - deg(v)`) unless a per-node table is
/// installed.
#[derive(Debug, Clone, Default)]
pub struct UniformField {
    curvature: Option<Vec<f64>>,
    mass: Vec<f64>,
    scalar: Vec<f64>,
    potential: Vec<f64>,
    stress: HashMap<EdgeKey, f64>,
    edge_energy: HashMap<EdgeKey, f64>,
}

impl UniformField {
    pub fn new(n: usize) -> Self {
        Self {
            curvature: None,
            mass: vec![0.0; n],
            scalar: vec![0.0; n],
            potential: vec![0.0; n],
            stress: HashMap::new(),
            edge_energy: HashMap::new(),
        }
    }

    pub fn with_curvature(mut self, curvature: Vec<f64>) -> Self {
        self.curvature = Some(curvature);
        self
    }

    pub fn with_mass(mut self, mass: Vec<f64>) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_scalar(mut self, scalar: Vec<f64>) -> Self {
        self.scalar = scalar;
        self
    }

    pub fn with_potential(mut self, potential: Vec<f64>) -> Self {
        self.potential = potential;
        self
    }

    pub fn set_stress_energy(&mut self, i: usize, j: usize, value: f64) {
        if let Some(k) = EdgeKey::new(i, j) {
            self.stress.insert(k, value);
        }
    }

    pub fn set_edge_energy(&mut self, i: usize, j: usize, value: f64) {
        if let Some(k) = EdgeKey::new(i, j) {
            self.edge_energy.insert(k, value);
        }
    }
}

impl FieldModel for UniformField {
    fn local_curvature(&self, graph: &Graph, node: usize) -> f64 {
        if let Some(table) = &self.curvature {
            return table.get(node).copied().unwrap_or(0.0);
        }
        let neighbours = graph.neighbors(node);
        if neighbours.is_empty() {
            return 0.0;
        }
        let d = graph.degree(node) as f64;
        let sum: f64 = neighbours
            .iter()
            .map(|&v| 4.0 - d - graph.degree(v) as f64)
            .sum();
        sum / neighbours.len() as f64
    }

    fn stress_energy(&self, i: usize, j: usize) -> f64 {
        EdgeKey::new(i, j)
            .and_then(|k| self.stress.get(&k).copied())
            .unwrap_or(0.0)
    }

    fn scalar(&self, node: usize) -> f64 {
        self.scalar.get(node).copied().unwrap_or(0.0)
    }

    fn mass(&self, node: usize) -> f64 {
        self.mass.get(node).copied().unwrap_or(0.0)
    }

    fn average_mass(&self) -> f64 {
        if self.mass.is_empty() {
            return 1.0;
        }
        let mean = self.mass.iter().sum::<f64>() / self.mass.len() as f64;
        if mean > 0.0 { mean } else { 1.0 }
    }

    fn potential(&self, node: usize) -> f64 {
        self.potential.get(node).copied().unwrap_or(0.0)
    }

    fn edge_energy(&self, i: usize, j: usize) -> f64 {
        EdgeKey::new(i, j)
            .and_then(|k| self.edge_energy.get(&k).copied())
            .unwrap_or(0.0)
    }
}
