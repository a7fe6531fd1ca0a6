//! # Topology Mutation Engine
//!
//! Proposes one edge change at a time and accepts it by a Metropolis rule
//! over the local action delta.
//!
//! ```text
//!  try_draws::<5>() ──► pick (i, j) ──► create | remove | reweight
//!        │ refused                           │
//!        ▼                                   ▼
//!     Budget            causal check (create) / gauge check (remove)
//!                                            │
//!                                            ▼
//!                       ΔS ≤ 0  or  u < exp(−ΔS/T)  ──►  commit
//! ```
//!
//! All five draws are paid in one debit, so a step the ledger cannot fund
//! leaves graph, phases and matter estimates untouched. Creates and
//! removes bump the graph's `topology_version`; reweights do not.

mod action;
pub mod cutoff;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::config::{GaugeConfig, TopologyConfig};
use crate::field::{finite_or_zero, FieldModel};
use crate::gauge::{EdgePhases, GaugeSafetyGuard, RemovalVerdict};
use crate::graph::Graph;
use crate::graph::traversal::hop_distance;
use crate::ledger::Entropy;
use crate::model::{EdgeKey, EdgeProposal, MoveKind};
use crate::{Error, Result};

use action::local_action_delta;
pub use cutoff::CutoffReport;

/// Uniform draws consumed by one proposal: `i`, `j`, move, perturbation,
/// acceptance.
pub const STEP_DRAWS: usize = 5;

/// Mutable state a topology step reads and writes.
pub struct MutationContext<'a> {
    pub graph: &'a mut Graph,
    pub phases: &'a mut EdgePhases,
    pub field: &'a dyn FieldModel,
    pub entropy: &'a mut Entropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The ledger refused the draws or the creation cost.
    Budget,
    InvalidEndpoints,
    /// The move draw chose not to create.
    NoMove,
    /// Create outside the light cone.
    Causality,
    /// Removal would destroy flux.
    Gauge,
    Metropolis,
    /// Non-finite action delta.
    Numerical,
    /// Reweight landed on the old quantized weight.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Accepted(MoveKind),
    Rejected(RejectReason),
}

impl StepOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted(_))
    }

    /// Create or remove; the caller must reschedule the endpoints.
    pub fn is_structural(&self) -> bool {
        matches!(self, StepOutcome::Accepted(MoveKind::Create | MoveKind::Remove))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStats {
    pub attempts: u64,
    pub created: u64,
    pub removed: u64,
    pub reweighted: u64,
    pub rejected_budget: u64,
    pub rejected_invalid: u64,
    pub rejected_no_move: u64,
    pub rejected_causality: u64,
    pub rejected_gauge: u64,
    pub rejected_metropolis: u64,
    pub rejected_numerical: u64,
    pub rejected_unchanged: u64,
    /// Edges removed by the Planck cutoff.
    pub cutoff_removed: u64,
}

impl MutationStats {
    pub fn accepted(&self) -> u64 {
        self.created + self.removed + self.reweighted
    }

    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Accepted(MoveKind::Create) => self.created += 1,
            StepOutcome::Accepted(MoveKind::Remove) => self.removed += 1,
            StepOutcome::Accepted(MoveKind::Reweight) => self.reweighted += 1,
            StepOutcome::Rejected(r) => match r {
                RejectReason::Budget => self.rejected_budget += 1,
                RejectReason::InvalidEndpoints => self.rejected_invalid += 1,
                RejectReason::NoMove => self.rejected_no_move += 1,
                RejectReason::Causality => self.rejected_causality += 1,
                RejectReason::Gauge => self.rejected_gauge += 1,
                RejectReason::Metropolis => self.rejected_metropolis += 1,
                RejectReason::Numerical => self.rejected_numerical += 1,
                RejectReason::Unchanged => self.rejected_unchanged += 1,
            },
        }
    }
}

/// Outcome of one `run_cycle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub attempts: usize,
    pub accepted: usize,
    pub structural: usize,
}

#[derive(Debug, Clone)]
pub struct TopologyMutationEngine {
    config: TopologyConfig,
    edge_creation_cost: f64,
    guard: GaugeSafetyGuard,
    /// Exponential moving average of stress-energy per edge.
    matter_ema: HashMap<EdgeKey, f64>,
    /// Edge touched by the most recent accepted create/remove.
    last_structural: Option<EdgeKey>,
    stats: MutationStats,
}

impl TopologyMutationEngine {
    /// Validates both config sections and the creation cost.
    pub fn new(config: TopologyConfig, gauge: GaugeConfig, edge_creation_cost: f64) -> Result<Self> {
        config.validate()?;
        gauge.validate()?;
        if !(edge_creation_cost.is_finite() && edge_creation_cost >= 0.0) {
            return Err(Error::Config("ledger.edge_creation_cost must be finite and >= 0".to_string()));
        }
        Ok(Self {
            config,
            edge_creation_cost,
            guard: GaugeSafetyGuard::new(gauge),
            matter_ema: HashMap::new(),
            last_structural: None,
            stats: MutationStats::default(),
        })
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn guard(&self) -> &GaugeSafetyGuard {
        &self.guard
    }

    pub fn stats(&self) -> &MutationStats {
        &self.stats
    }

    /// Edge of the most recent accepted create or remove, cleared by every
    /// new proposal.
    pub fn last_structural(&self) -> Option<EdgeKey> {
        self.last_structural
    }

    /// Smoothed stress-energy on `i-j`, if the edge has been evaluated.
    pub fn matter_estimate(&self, i: usize, j: usize) -> Option<f64> {
        EdgeKey::new(i, j).and_then(|k| self.matter_ema.get(&k).copied())
    }

    /// Snap to the weight lattice and clamp to `[min_weight, max_weight]`.
    pub fn quantize(&self, w: f64) -> f64 {
        let q = self.config.weight_quantum;
        let snapped = if q > 0.0 { (w / q).round() * q } else { w };
        snapped.clamp(self.config.min_weight, self.config.max_weight)
    }

    /// A new edge may only join nodes within `max_hops` of each other.
    pub fn is_causally_allowed(&self, graph: &Graph, i: usize, j: usize) -> bool {
        i != j && hop_distance(graph, i, j, self.config.max_hops).is_some()
    }

    /// Draw, propose and resolve one edge mutation.
    pub fn propose_step(&mut self, ctx: &mut MutationContext<'_>) -> StepOutcome {
        self.last_structural = None;
        let n = ctx.graph.node_count();
        if n < 2 {
            return self.reject_unresolved(RejectReason::InvalidEndpoints);
        }
        let Some([u_i, u_j, u_move, u_perturb, u_accept]) = ctx.entropy.try_draws::<STEP_DRAWS>() else {
            tracing::debug!("topology step refused by ledger");
            return self.reject_unresolved(RejectReason::Budget);
        };

        let i = ((u_i * n as f64) as usize).min(n - 1);
        let mut j = ((u_j * (n - 1) as f64) as usize).min(n - 2);
        if j >= i {
            j += 1;
        }

        let proposal = match ctx.graph.weight(i, j) {
            None if u_move < self.config.create_probability => {
                EdgeProposal::create(i, j, self.quantize(self.config.creation_weight))
            }
            None => return self.reject_unresolved(RejectReason::NoMove),
            Some(w) if u_move < self.config.remove_probability && w < self.config.removal_weight_threshold => {
                EdgeProposal::remove(i, j, w)
            }
            Some(w) => {
                let target = w + (2.0 * u_perturb - 1.0) * self.config.reweight_step;
                EdgeProposal::reweight(i, j, w, self.quantize(target))
            }
        };

        self.resolve(ctx, proposal, u_accept)
    }

    /// Check, evaluate and (maybe) commit an explicit proposal, using
    /// `accept_u` as the Metropolis uniform. Draws nothing.
    pub fn resolve(&mut self, ctx: &mut MutationContext<'_>, proposal: EdgeProposal, accept_u: f64) -> StepOutcome {
        self.stats.attempts += 1;
        self.last_structural = None;
        let outcome = self.resolve_inner(ctx, proposal, accept_u);
        self.stats.record(outcome);
        if outcome.is_structural() {
            self.last_structural = proposal.key();
        }
        outcome
    }

    fn resolve_inner(&mut self, ctx: &mut MutationContext<'_>, mut proposal: EdgeProposal, accept_u: f64) -> StepOutcome {
        let (i, j) = (proposal.i, proposal.j);
        let Some(key) = proposal.key() else { return StepOutcome::Rejected(RejectReason::InvalidEndpoints) };
        if !ctx.graph.contains(key.hi) {
            return StepOutcome::Rejected(RejectReason::InvalidEndpoints);
        }

        let current = ctx.graph.weight(i, j);
        let verdict = match (proposal.kind(), current) {
            (MoveKind::Create, None) => {
                if !self.is_causally_allowed(ctx.graph, i, j) {
                    tracing::debug!(i, j, "create outside light cone");
                    return StepOutcome::Rejected(RejectReason::Causality);
                }
                proposal.new_weight = self.quantize(proposal.new_weight);
                None
            }
            (MoveKind::Remove, Some(w)) => {
                proposal.old_weight = w;
                let verdict = self.guard.assess_removal(ctx.graph, ctx.phases, i, j);
                if !verdict.is_safe() {
                    return StepOutcome::Rejected(RejectReason::Gauge);
                }
                Some(verdict)
            }
            (MoveKind::Reweight, Some(w)) => {
                proposal.old_weight = w;
                proposal.new_weight = self.quantize(proposal.new_weight);
                if (proposal.new_weight - w).abs() < f64::EPSILON {
                    return StepOutcome::Rejected(RejectReason::Unchanged);
                }
                None
            }
            _ => return StepOutcome::Rejected(RejectReason::InvalidEndpoints),
        };

        ctx.graph.refresh_caches();
        let sample = finite_or_zero(ctx.field.stress_energy(i, j));
        // An absent edge has no history; its estimate starts on commit.
        let matter = match proposal.kind() {
            MoveKind::Create => sample,
            MoveKind::Remove | MoveKind::Reweight => self.observe_matter(key, sample),
        };
        let delta = local_action_delta(ctx.graph, ctx.field, &self.config, &proposal, matter);
        let ds = delta.total();
        if !ds.is_finite() {
            tracing::debug!(i, j, ?delta, "non-finite action delta");
            return StepOutcome::Rejected(RejectReason::Numerical);
        }
        let accepted = ds <= 0.0 || accept_u < (-ds / self.config.temperature).exp();
        if !accepted {
            return StepOutcome::Rejected(RejectReason::Metropolis);
        }

        match proposal.kind() {
            MoveKind::Create => {
                if !ctx.entropy.ledger().try_spend_vacuum_energy(self.edge_creation_cost) {
                    return StepOutcome::Rejected(RejectReason::Budget);
                }
                ctx.graph.insert_edge(i, j, proposal.new_weight);
                ctx.phases.set(i, j, 0.0);
                self.matter_ema.insert(key, matter);
                tracing::trace!(i, j, w = proposal.new_weight, ds, "edge created");
            }
            MoveKind::Remove => {
                self.commit_removal(ctx, key, verdict.unwrap_or(RemovalVerdict::Safe));
                tracing::trace!(i, j, ds, "edge removed");
            }
            MoveKind::Reweight => {
                ctx.graph.set_weight(i, j, proposal.new_weight);
            }
        }
        StepOutcome::Accepted(proposal.kind())
    }

    /// Run `max(10, N/10)` proposals. `on_structural` sees the graph right
    /// after each committed create or remove.
    pub fn run_cycle<S>(&mut self, ctx: &mut MutationContext<'_>, mut on_structural: S) -> CycleReport
    where
        S: FnMut(&mut Graph, &dyn FieldModel, EdgeKey),
    {
        let attempts = (ctx.graph.node_count() / 10).max(10);
        let mut report = CycleReport { attempts, ..Default::default() };
        for _ in 0..attempts {
            let outcome = self.propose_step(ctx);
            if outcome.is_accepted() {
                report.accepted += 1;
            }
            if let (true, Some(edge)) = (outcome.is_structural(), self.last_structural) {
                report.structural += 1;
                on_structural(ctx.graph, ctx.field, edge);
            }
        }
        report
    }

    /// Count an attempt that never reached `resolve`.
    fn reject_unresolved(&mut self, reason: RejectReason) -> StepOutcome {
        let outcome = StepOutcome::Rejected(reason);
        self.stats.attempts += 1;
        self.stats.record(outcome);
        outcome
    }

    fn observe_matter(&mut self, key: EdgeKey, sample: f64) -> f64 {
        let alpha = self.config.matter_ema_alpha;
        let ema = self
            .matter_ema
            .entry(key)
            .and_modify(|m| *m = (1.0 - alpha) * *m + alpha * sample)
            .or_insert(sample);
        *ema
    }

    /// Repair phases, drop the edge and return its energy plus the creation
    /// cost to the pool. The verdict must already be safe.
    pub(crate) fn commit_removal(&mut self, ctx: &mut MutationContext<'_>, key: EdgeKey, verdict: RemovalVerdict) {
        if let RemovalVerdict::Redistribute(plan) = &verdict {
            self.guard.redistribute(ctx.phases, plan);
        }
        ctx.phases.remove(key.lo, key.hi);
        if ctx.graph.remove_edge(key.lo, key.hi).is_some() {
            let energy = finite_or_zero(ctx.field.edge_energy(key.lo, key.hi)).max(0.0);
            ctx.entropy.ledger().register_radiation(energy + self.edge_creation_cost);
        }
        self.matter_ema.remove(&key);
    }
}
