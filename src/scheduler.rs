//! # Causal Event Scheduler
//!
//! A single event-time axis. Events pop in non-decreasing time order and
//! are dispatched to the node state machine; each node re-enqueues its own
//! next `Update` after a lapse-dependent interval, so nodes in heavy
//! regions tick less often.
//!
//! ## Ordering
//!
//! Equal-time events dispatch FIFO by insertion sequence. An event
//! scheduled before the current reference time is clamped to it.
//!
//! ## Update chains
//!
//! Scheduling never deduplicates: any number of events for a node may sit
//! in the queue. Each node, however, has one live `Update` chain, the
//! most recently scheduled `Update`. Older `Update` events for that node
//! are dequeued as superseded and do nothing; this is how topology
//! feedback moves a node's clock without growing duplicate chains.
//! `Signal` and `Measurement` events are never superseded.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::{SchedulerConfig, TimeStepMode};
use crate::field::FieldModel;
use crate::graph::Graph;
use crate::graph::traversal::geodesic_distance;
use crate::ledger::Entropy;
use crate::model::{Event, EventKind, NodeId, NodeState};
use crate::state_machine::{LocalInputs, NodeStateMachine, Transition};

// ============================================================================
// Dispatch context
// ============================================================================

/// Everything an event dispatch may read or write.
pub struct EventContext<'a> {
    pub graph: &'a mut Graph,
    pub field: &'a dyn FieldModel,
    pub entropy: &'a mut Entropy,
    pub machine: &'a NodeStateMachine,
}

// ============================================================================
// Time dilation
// ============================================================================

/// Gravitational lapse in `[min_dilation, 1]`; shrinks with mass and curvature.
pub fn lapse(config: &SchedulerConfig, mass: f64, curvature: f64) -> f64 {
    let load = mass.max(0.0) + curvature.abs();
    let raw = 1.0 / (1.0 + config.lapse_coupling * load);
    if raw.is_finite() { raw.clamp(config.min_dilation, 1.0) } else { config.min_dilation }
}

/// Coordinate time until the node's next update.
pub fn next_interval(config: &SchedulerConfig, lapse: f64, curvature: f64) -> f64 {
    let lo = config.base_step * config.min_dilation;
    let hi = config.base_step / config.min_dilation;
    let dt = match config.time_step_mode {
        TimeStepMode::Lapse => config.base_step / lapse,
        TimeStepMode::Curvature => 1.0 / (curvature.abs() + config.curvature_epsilon).sqrt(),
    };
    if dt.is_finite() { dt.clamp(lo, hi) } else { hi }
}

// ============================================================================
// Queue entries
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Queued {
    event: Event,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap: earliest time, then lowest sequence, wins.
    fn cmp(&self, other: &Self) -> Ordering {
        other.event.time.total_cmp(&self.event.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// State sample taken by a `Measurement` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub time: f64,
    pub node: NodeId,
    pub state: NodeState,
    pub proper_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub dropped: u64,
    pub dispatched: u64,
    pub updates: u64,
    pub superseded: u64,
    pub signals_sent: u64,
    pub signals_received: u64,
    pub measurements: u64,
    pub excitations: u64,
    pub firings: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    QueueEmpty,
    MaxEvents,
    Horizon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub dispatched: usize,
    pub final_time: f64,
    pub stop: StopReason,
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone)]
pub struct CausalEventScheduler {
    config: SchedulerConfig,
    queue: BinaryHeap<Queued>,
    seq: u64,
    current_time: f64,
    last_dispatched: f64,
    /// Time of each node's live `Update`.
    chain_head: Vec<Option<f64>>,
    measurements: VecDeque<Measurement>,
    stats: SchedulerStats,
}

impl CausalEventScheduler {
    pub fn new(config: SchedulerConfig, node_count: usize) -> Self {
        Self {
            config,
            queue: BinaryHeap::new(),
            seq: 0,
            current_time: 0.0,
            last_dispatched: f64::NEG_INFINITY,
            chain_head: vec![None; node_count],
            measurements: VecDeque::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Global reference time: the time of the last dispatched event.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|q| q.event.time)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn drain_measurements(&mut self) -> Vec<Measurement> {
        self.measurements.drain(..).collect()
    }

    /// Enqueue an `Update` for every node at the current time.
    pub fn schedule_initial(&mut self, graph: &mut Graph) {
        let now = self.current_time;
        for (i, node) in graph.nodes_mut().iter_mut().enumerate() {
            node.next_update_time = now;
            self.schedule(i, now, EventKind::Update);
        }
    }

    /// Push an event. Malformed node ids and non-finite times are ignored
    /// and reported as `false`.
    pub fn schedule(&mut self, node: usize, time: f64, kind: EventKind) -> bool {
        if node >= self.chain_head.len() {
            tracing::debug!(node, "ignoring event for unknown node");
            self.stats.dropped += 1;
            return false;
        }
        if let EventKind::Signal { source } = kind {
            if source.index() >= self.chain_head.len() {
                tracing::debug!(node, source = source.index(), "ignoring signal from unknown node");
                self.stats.dropped += 1;
                return false;
            }
        }
        if !time.is_finite() {
            tracing::warn!(node, time, "ignoring event with non-finite time");
            self.stats.dropped += 1;
            return false;
        }
        let time = time.max(self.current_time);
        if kind == EventKind::Update {
            self.chain_head[node] = Some(time);
        }
        self.queue.push(Queued { event: Event { time, node: NodeId(node), kind }, seq: self.seq });
        self.seq += 1;
        self.stats.scheduled += 1;
        true
    }

    /// Schedule a `Signal` at `target` arriving after the light-travel time
    /// `geodesic(source, target) / c`. Unreachable targets get nothing.
    pub fn propagate_signal(&mut self, graph: &Graph, source: usize, target: usize) -> bool {
        if source == target || !graph.contains(source) || !graph.contains(target) {
            return false;
        }
        let Some(distance) = geodesic_distance(graph, source, target) else {
            return false;
        };
        let arrival = self.current_time + distance / self.config.signal_speed;
        let sent = self.schedule(target, arrival, EventKind::Signal { source: NodeId(source) });
        if sent {
            self.stats.signals_sent += 1;
        }
        sent
    }

    /// Restart `node`'s update chain from the current time, using the lapse
    /// of its present neighbourhood. Called after a structural change moves
    /// the node's curvature.
    pub fn reschedule_update(&mut self, graph: &mut Graph, field: &dyn FieldModel, node: usize) -> bool {
        if !graph.contains(node) {
            return false;
        }
        let inputs = LocalInputs::gather(graph, field, node);
        let lapse = lapse(&self.config, inputs.mass, inputs.curvature);
        let next = self.current_time + next_interval(&self.config, lapse, inputs.curvature);
        if let Some(record) = graph.node_mut(node) {
            record.time_dilation = lapse;
            record.next_update_time = next;
        }
        self.schedule(node, next, EventKind::Update)
    }

    /// Pop and dispatch the earliest event.
    pub fn step(&mut self, ctx: &mut EventContext<'_>) -> Option<Event> {
        let Queued { event, .. } = self.queue.pop()?;
        debug_assert!(event.time >= self.last_dispatched, "causal order violated");
        self.current_time = event.time;
        self.last_dispatched = event.time;
        self.stats.dispatched += 1;
        tracing::trace!(node = event.node.index(), time = event.time, kind = ?event.kind, "dispatch");

        match event.kind {
            EventKind::Update => self.dispatch_update(ctx, event),
            EventKind::Signal { source } => self.dispatch_signal(ctx, event, source),
            EventKind::Measurement => self.dispatch_measurement(ctx, event),
        }
        Some(event)
    }

    /// Run until the queue empties, `max_events` are dispatched, or the next
    /// event lies beyond `current_time + duration`.
    pub fn run(&mut self, ctx: &mut EventContext<'_>, duration: f64, max_events: usize) -> RunSummary {
        let horizon = self.current_time + duration.max(0.0);
        self.run_until(ctx, Some(horizon), max_events)
    }

    /// Run without a time horizon.
    pub fn run_relational_loop(&mut self, ctx: &mut EventContext<'_>, max_events: usize) -> RunSummary {
        self.run_until(ctx, None, max_events)
    }

    fn run_until(&mut self, ctx: &mut EventContext<'_>, horizon: Option<f64>, max_events: usize) -> RunSummary {
        let mut dispatched = 0;
        let stop = loop {
            if dispatched >= max_events {
                break StopReason::MaxEvents;
            }
            let Some(next) = self.peek_time() else { break StopReason::QueueEmpty };
            if horizon.is_some_and(|h| next > h) {
                break StopReason::Horizon;
            }
            self.step(ctx);
            dispatched += 1;
        };
        if let (StopReason::Horizon, Some(h)) = (stop, horizon) {
            self.current_time = self.current_time.max(h);
        }
        RunSummary { dispatched, final_time: self.current_time, stop }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn dispatch_update(&mut self, ctx: &mut EventContext<'_>, event: Event) {
        let i = event.node.index();
        if self.chain_head.get(i).copied().flatten() != Some(event.time) {
            self.stats.superseded += 1;
            return;
        }
        let Some(state) = ctx.graph.state(i) else { return };
        self.stats.updates += 1;

        let inputs = LocalInputs::gather(ctx.graph, ctx.field, i);
        let draw = if NodeStateMachine::needs_draw(state) { ctx.entropy.try_draw() } else { None };
        let lapse = lapse(&self.config, inputs.mass, inputs.curvature);
        let dt = next_interval(&self.config, lapse, inputs.curvature);
        let next = event.time + dt;

        let Some(record) = ctx.graph.node_mut(i) else { return };
        let transition = ctx.machine.advance(record, &inputs, draw);
        record.time_dilation = lapse;
        record.proper_time += dt * lapse;
        record.next_update_time = next;

        match transition {
            Transition::Excited => self.stats.excitations += 1,
            Transition::Fired { .. } => {
                self.stats.firings += 1;
                let neighbours: Vec<usize> = ctx.graph.neighbors(i).to_vec();
                for v in neighbours {
                    self.propagate_signal(ctx.graph, i, v);
                }
            }
            _ => {}
        }

        self.schedule(i, next, EventKind::Update);
    }

    fn dispatch_signal(&mut self, ctx: &mut EventContext<'_>, event: Event, source: NodeId) {
        let i = event.node.index();
        let Some(state) = ctx.graph.state(i) else { return };
        self.stats.signals_received += 1;
        let weight = ctx.graph.weight(source.index(), i).unwrap_or(1.0);
        let draw = if NodeStateMachine::needs_draw(state) { ctx.entropy.try_draw() } else { None };
        let Some(record) = ctx.graph.node_mut(i) else { return };
        if ctx.machine.receive_signal(record, weight, draw) == Transition::Excited {
            self.stats.excitations += 1;
        }
    }

    fn dispatch_measurement(&mut self, ctx: &mut EventContext<'_>, event: Event) {
        let Some(record) = ctx.graph.node(event.node.index()) else { return };
        self.stats.measurements += 1;
        if self.config.measurement_capacity == 0 {
            return;
        }
        if self.measurements.len() >= self.config.measurement_capacity {
            self.measurements.pop_front();
        }
        self.measurements.push_back(Measurement {
            time: event.time,
            node: event.node,
            state: record.state,
            proper_time: record.proper_time,
        });
    }
}
