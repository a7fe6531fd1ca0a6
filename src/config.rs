//! Simulation configuration.
//!
//! Every section deserializes with defaults, so a partial JSON document
//! only needs the values it overrides.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the ledger-gated RNG. Default: 42.
    pub seed: u64,
    pub ledger: LedgerConfig,
    pub scheduler: SchedulerConfig,
    pub node: StateMachineConfig,
    pub topology: TopologyConfig,
    pub gauge: GaugeConfig,
    pub parallel: ParallelConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ledger: LedgerConfig::default(),
            scheduler: SchedulerConfig::default(),
            node: StateMachineConfig::default(),
            topology: TopologyConfig::default(),
            gauge: GaugeConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.scheduler.validate()?;
        self.node.validate()?;
        self.topology.validate()?;
        self.gauge.validate()?;
        Ok(())
    }
}

fn require(ok: bool, what: &str) -> Result<()> {
    if ok { Ok(()) } else { Err(Error::Config(what.to_string())) }
}

// ============================================================================
// Energy ledger
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Initial vacuum pool balance. Default: 1000.0.
    pub initial_balance: f64,
    /// Cost of a single random draw. Default: 0.001.
    pub rng_draw_cost: f64,
    /// Cost debited when an edge is created, refunded on removal. Default: 0.05.
    pub edge_creation_cost: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { initial_balance: 1000.0, rng_draw_cost: 0.001, edge_creation_cost: 0.05 }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.initial_balance.is_finite() && self.initial_balance >= 0.0,
            "ledger.initial_balance must be finite and >= 0")?;
        require(self.rng_draw_cost.is_finite() && self.rng_draw_cost >= 0.0,
            "ledger.rng_draw_cost must be finite and >= 0")?;
        require(self.edge_creation_cost.is_finite() && self.edge_creation_cost >= 0.0,
            "ledger.edge_creation_cost must be finite and >= 0")
    }
}

// ============================================================================
// Causal scheduler
// ============================================================================

/// How a node's next update interval is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeStepMode {
    /// `base_step / lapse`, lapse from local mass + curvature.
    Lapse,
    /// `1/sqrt(|R| + ε)` clamped around `base_step`.
    Curvature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Proper-time tick per update. Default: 0.01.
    pub base_step: f64,
    /// Signal propagation speed `c`. Default: 1.0.
    pub signal_speed: f64,
    /// Lower bound on the lapse, in `(0, 1]`. Default: 0.1.
    pub min_dilation: f64,
    /// Regulator `ε` for the curvature-driven step. Default: 1e-6.
    pub curvature_epsilon: f64,
    /// Strength of gravitational time dilation. Default: 0.5.
    pub lapse_coupling: f64,
    /// Default: `Lapse`.
    pub time_step_mode: TimeStepMode,
    /// Maximum retained measurement records. Default: 4096.
    pub measurement_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_step: 0.01,
            signal_speed: 1.0,
            min_dilation: 0.1,
            curvature_epsilon: 1e-6,
            lapse_coupling: 0.5,
            time_step_mode: TimeStepMode::Lapse,
            measurement_capacity: 4096,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.base_step.is_finite() && self.base_step > 0.0,
            "scheduler.base_step must be > 0")?;
        require(self.signal_speed.is_finite() && self.signal_speed > 0.0,
            "scheduler.signal_speed must be > 0")?;
        require(self.min_dilation > 0.0 && self.min_dilation <= 1.0,
            "scheduler.min_dilation must lie in (0, 1]")?;
        require(self.curvature_epsilon.is_finite() && self.curvature_epsilon > 0.0,
            "scheduler.curvature_epsilon must be > 0")?;
        require(self.lapse_coupling.is_finite() && self.lapse_coupling >= 0.0,
            "scheduler.lapse_coupling must be >= 0")
    }
}

// ============================================================================
// Node state machine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    /// Refractory steps before the mass-dependent term. Default: 3.
    pub base_refractory_steps: u32,
    /// Cap on the curvature-driven spontaneous term. Default: 0.5.
    pub spontaneous_cap: f64,
    /// Cap on the combined excitation probability. Default: 0.99.
    pub excitation_cap: f64,
    /// Gain of the local potential boost; 0 disables it. Default: 0.0.
    pub potential_gain: f64,
    /// Gain applied to an arriving signal's edge weight. Default: 1.0.
    pub signal_gain: f64,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            base_refractory_steps: 3,
            spontaneous_cap: 0.5,
            excitation_cap: 0.99,
            potential_gain: 0.0,
            signal_gain: 1.0,
        }
    }
}

impl StateMachineConfig {
    pub fn validate(&self) -> Result<()> {
        require((0.0..=1.0).contains(&self.spontaneous_cap), "node.spontaneous_cap must lie in [0, 1]")?;
        require((0.0..=1.0).contains(&self.excitation_cap), "node.excitation_cap must lie in [0, 1]")?;
        require(self.potential_gain.is_finite() && self.potential_gain >= 0.0, "node.potential_gain must be >= 0")?;
        require(self.signal_gain.is_finite() && self.signal_gain >= 0.0, "node.signal_gain must be >= 0")
    }
}

// ============================================================================
// Topology mutation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Metropolis temperature. Default: 0.1.
    pub temperature: f64,
    /// Causal horizon for edge creation, in hops. Default: 2.
    pub max_hops: usize,
    /// Weight quantum. Default: 0.01.
    pub weight_quantum: f64,
    /// Lower weight bound for surviving edges. Default: 0.05.
    pub min_weight: f64,
    /// Upper weight bound. Default: 1.0.
    pub max_weight: f64,
    /// Weight given to a freshly created edge. Default: 0.1.
    pub creation_weight: f64,
    /// Edges lighter than this may be proposed for removal. Default: 0.1.
    pub removal_weight_threshold: f64,
    /// Probability of proposing a create when the edge is absent. Default: 0.5.
    pub create_probability: f64,
    /// Probability of proposing a removal when the edge is present. Default: 0.5.
    pub remove_probability: f64,
    /// Half-width of the reweight perturbation. Default: 0.05.
    pub reweight_step: f64,
    /// Gravitational coupling `G`; geometry enters as `1/G`. Default: 1.0.
    pub gravitational_coupling: f64,
    /// Matter–geometry coupling. Default: 1.0.
    pub matter_coupling: f64,
    /// EMA factor for the local stress-energy estimate. Default: 0.05.
    pub matter_ema_alpha: f64,
    /// Volume restoring strength. Default: 1.0.
    pub volume_coupling: f64,
    /// Target total edge weight. Default: 10.0.
    pub target_total_weight: f64,
    /// Scalar gradient coupling. Default: 1.0.
    pub field_coupling: f64,
    /// Penalty per unit weight for same-parity edges. Default: 0.5.
    pub chirality_penalty: f64,
    /// Planck cutoff removes edges with `w <= min_weight + cutoff_margin`. Default: 1e-9.
    pub cutoff_margin: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_hops: 2,
            weight_quantum: 0.01,
            min_weight: 0.05,
            max_weight: 1.0,
            creation_weight: 0.1,
            removal_weight_threshold: 0.1,
            create_probability: 0.5,
            remove_probability: 0.5,
            reweight_step: 0.05,
            gravitational_coupling: 1.0,
            matter_coupling: 1.0,
            matter_ema_alpha: 0.05,
            volume_coupling: 1.0,
            target_total_weight: 10.0,
            field_coupling: 1.0,
            chirality_penalty: 0.5,
            cutoff_margin: 1e-9,
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.temperature.is_finite() && self.temperature > 0.0, "topology.temperature must be > 0")?;
        require(self.max_hops >= 1, "topology.max_hops must be >= 1")?;
        require(self.weight_quantum.is_finite() && self.weight_quantum > 0.0, "topology.weight_quantum must be > 0")?;
        require(self.min_weight > 0.0 && self.min_weight <= self.max_weight,
            "topology.min_weight must lie in (0, max_weight]")?;
        require(self.max_weight.is_finite(), "topology.max_weight must be finite")?;
        require(self.creation_weight > 0.0 && self.creation_weight <= self.max_weight,
            "topology.creation_weight must lie in (0, max_weight]")?;
        require((0.0..=1.0).contains(&self.create_probability), "topology.create_probability must lie in [0, 1]")?;
        require((0.0..=1.0).contains(&self.remove_probability), "topology.remove_probability must lie in [0, 1]")?;
        require((0.0..=1.0).contains(&self.matter_ema_alpha), "topology.matter_ema_alpha must lie in [0, 1]")?;
        require(self.gravitational_coupling.is_finite() && self.gravitational_coupling > 0.0,
            "topology.gravitational_coupling must be > 0")?;
        require(
            [self.reweight_step, self.matter_coupling, self.volume_coupling, self.target_total_weight,
             self.field_coupling, self.chirality_penalty, self.cutoff_margin]
                .iter()
                .all(|v| v.is_finite()),
            "topology couplings must be finite",
        )
    }
}

// ============================================================================
// Gauge safety
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugeConfig {
    /// Wilson-loop magnitude above which a triangle carries flux. Default: 1e-6.
    pub flux_tolerance: f64,
    /// Own-phase threshold for edges that close no triangle. Default: 1e-6.
    pub trivial_phase_threshold: f64,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self { flux_tolerance: 1e-6, trivial_phase_threshold: 1e-6 }
    }
}

impl GaugeConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.flux_tolerance.is_finite() && self.flux_tolerance >= 0.0, "gauge.flux_tolerance must be >= 0")?;
        require(self.trivial_phase_threshold.is_finite() && self.trivial_phase_threshold >= 0.0,
            "gauge.trivial_phase_threshold must be >= 0")
    }
}

// ============================================================================
// Parallel sweeps
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Colour classes smaller than this run on the calling thread. Default: 64.
    pub min_parallel_batch: usize,
    /// Sweeps per batch in batched mode. Default: 4.
    pub batch_sweeps: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { min_parallel_batch: 64, batch_sweeps: 4 }
    }
}
