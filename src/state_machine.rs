//! Node excitation cycle: `Rest -> Excited -> Refractory -> Rest`.
//!
//! The machine reads the neighbourhood through [`LocalInputs`] and writes
//! only the node's own [`NodeRecord`], so the scheduler and colour-class
//! sweeps can both drive it without racing on neighbour state.

use serde::{Deserialize, Serialize};

use crate::config::StateMachineConfig;
use crate::field::{finite_or_zero, FieldModel};
use crate::graph::Graph;
use crate::model::{NodeRecord, NodeState};

/// Neighbourhood snapshot feeding one transition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalInputs {
    pub curvature: f64,
    pub mass: f64,
    pub average_mass: f64,
    pub potential: f64,
    /// Fraction of neighbours currently excited.
    pub excited_fraction: f64,
    /// Mean weight of the edges to excited neighbours.
    pub excited_mean_weight: f64,
}

impl LocalInputs {
    pub fn gather(graph: &Graph, field: &dyn FieldModel, node: usize) -> Self {
        let neighbours = graph.neighbors(node);
        let (excited, weight_sum) = neighbours
            .iter()
            .filter(|&&v| graph.node(v).is_some_and(NodeRecord::is_excited))
            .fold((0usize, 0.0), |(n, s), &v| (n + 1, s + graph.weight(node, v).unwrap_or(0.0)));

        let (excited_fraction, excited_mean_weight) = if excited == 0 {
            (0.0, 0.0)
        } else {
            (excited as f64 / neighbours.len() as f64, weight_sum / excited as f64)
        };

        Self {
            curvature: finite_or_zero(field.local_curvature(graph, node)),
            mass: finite_or_zero(field.mass(node)),
            average_mass: finite_or_zero(field.average_mass()),
            potential: finite_or_zero(field.potential(node)),
            excited_fraction,
            excited_mean_weight,
        }
    }
}

/// What a single update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Unchanged,
    /// `Rest -> Excited`.
    Excited,
    /// `Excited -> Refractory`; the caller emits signals to every neighbour.
    Fired { refractory: u32 },
    Countdown { remaining: u32 },
    /// `Refractory -> Rest`.
    Recovered,
}

#[derive(Debug, Clone, Default)]
pub struct NodeStateMachine {
    config: StateMachineConfig,
}

impl NodeStateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.config
    }

    /// Only resting nodes consume a random draw.
    pub fn needs_draw(state: NodeState) -> bool {
        state == NodeState::Rest
    }

    pub fn excitation_probability(&self, inputs: &LocalInputs) -> f64 {
        let spontaneous = (1.0 - (-inputs.curvature.abs()).exp()).clamp(0.0, self.config.spontaneous_cap);
        let drive = inputs.excited_fraction * inputs.excited_mean_weight;
        let induced = 1.0 - (-drive.max(0.0)).exp();
        let mut p = (spontaneous + induced).clamp(0.0, self.config.excitation_cap);
        if self.config.potential_gain > 0.0 && inputs.potential > 0.0 {
            p += (1.0 - p) * (self.config.potential_gain * inputs.potential).tanh();
            p = p.clamp(0.0, self.config.excitation_cap);
        }
        finite_or_zero(p)
    }

    /// `base + round(mass / ⟨mass⟩)`, never negative.
    pub fn refractory_duration(&self, inputs: &LocalInputs) -> u32 {
        let extra = if inputs.average_mass > 0.0 {
            (inputs.mass.max(0.0) / inputs.average_mass).round()
        } else {
            0.0
        };
        let extra = if extra.is_finite() { extra.min(u32::MAX as f64) as u32 } else { 0 };
        self.config.base_refractory_steps.saturating_add(extra)
    }

    /// Advance one update. A resting node without a `draw` (budget refused)
    /// stays put.
    pub fn advance(&self, record: &mut NodeRecord, inputs: &LocalInputs, draw: Option<f64>) -> Transition {
        match record.state {
            NodeState::Rest => match draw {
                Some(u) if u < self.excitation_probability(inputs) => {
                    record.state = NodeState::Excited;
                    Transition::Excited
                }
                _ => Transition::Unchanged,
            },
            NodeState::Excited => {
                let refractory = self.refractory_duration(inputs);
                record.state = NodeState::Refractory;
                record.refractory_counter = refractory;
                Transition::Fired { refractory }
            }
            NodeState::Refractory => {
                record.refractory_counter = record.refractory_counter.saturating_sub(1);
                if record.refractory_counter == 0 {
                    record.state = NodeState::Rest;
                    Transition::Recovered
                } else {
                    Transition::Countdown { remaining: record.refractory_counter }
                }
            }
        }
    }

    /// An arriving signal over a link of weight `weight` may excite a
    /// resting node with probability `1 - exp(-gain·w)`.
    pub fn receive_signal(&self, record: &mut NodeRecord, weight: f64, draw: Option<f64>) -> Transition {
        if record.state != NodeState::Rest {
            return Transition::Unchanged;
        }
        let p = (1.0 - (-self.config.signal_gain * weight.max(0.0)).exp()).clamp(0.0, self.config.excitation_cap);
        match draw {
            Some(u) if u < p => {
                record.state = NodeState::Excited;
                Transition::Excited
            }
            _ => Transition::Unchanged,
        }
    }
}
